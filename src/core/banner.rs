//! Startup banner

pub fn print_banner(host: &str, port: u16, auth_enabled: bool, data_dir: &str) {
    println!();
    println!("  Unified Realtime Messaging Hub");
    println!("  ──────────────────────────────");
    println!("  listening   ws://{}:{}/api/v69/ws", host, port);
    println!(
        "  auth        {}",
        if auth_enabled { "enabled" } else { "DISABLED" }
    );
    println!("  data dir    {}", data_dir);
    println!();
}
