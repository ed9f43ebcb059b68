//! reclist - replay a record-list scenario.
//!
//! Loads a scenario file, sets up the list against in-memory collaborators
//! and runs every step, printing what happened and the notices shown.

mod scenario;

use std::path::PathBuf;

use reclist_core::{AppSettings, NoticeLevel};

use crate::scenario::{Replay, Scenario};

fn usage() -> String {
    "Usage: reclist <scenario.json>".to_string()
}

fn settings_for(scenario: &Scenario) -> Result<AppSettings, String> {
    match &scenario.settings {
        Some(settings) => Ok(settings.clone()),
        None => AppSettings::load_or_default().map_err(|e| format!("Failed to load settings: {}", e)),
    }
}

async fn replay(path: PathBuf) -> Result<(), String> {
    let scenario = Scenario::load(&path)?;
    let settings = settings_for(&scenario)?;
    let replay = Replay::setup(&scenario, settings).await?;

    println!(
        "{} list: {} rows, actions [{}]",
        scenario.entity_type,
        replay.list.rows().row_ids().len(),
        replay.list.mass_actions().join(", ")
    );

    let mut shown = 0;
    for (index, step) in scenario.steps.iter().enumerate() {
        let line = replay.run(step).await;
        println!("{:>3}. {}", index + 1, line);

        let notices = replay.interaction.notices();
        for notice in &notices[shown..] {
            if notice.level == NoticeLevel::Progress {
                continue;
            }
            let params = notice
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            println!("     [{:?}] {} {}", notice.level, notice.key, params);
        }
        shown = notices.len();
    }

    let selection = replay.list.selection();
    let rows = replay.list.rows().view();
    let total = if rows.display_total_count {
        format!(" of {}", rows.total)
    } else {
        String::new()
    };
    println!(
        "Final: {} rows{}, {} checked, all results: {}",
        rows.row_ids.len(),
        total,
        selection.count(),
        selection.all_results
    );
    replay.list.teardown();
    Ok(())
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reclist=info")),
        )
        .init();

    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("{}", usage());
        std::process::exit(2);
    };

    let rt = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(replay(path)) {
        tracing::error!("Replay failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
