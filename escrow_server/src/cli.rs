use std::{env, env::VarError};

/// There's no real CLI for the daemon. Any argument prints the help text and the configuration, and the caller
/// should exit.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 10] = [
        "RUST_LOG",
        "ESC_DATABASE_URL",
        "ESC_MAX_CONNECTIONS",
        "ESC_HOLD_WINDOW_MINS",
        "ESC_TRADE_WINDOW_MINS",
        "ESC_DISPUTE_EXTENSION_MINS",
        "ESC_SWEEP_INTERVAL_SECS",
        "ESC_SWEEP_BATCH_SIZE",
        "ESC_EXPIRY_RETRY_SECS",
        "ESC_EVENT_BUFFER_SIZE",
    ];

    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
