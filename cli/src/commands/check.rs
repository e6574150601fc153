use archivist_core::api::{check_installation, executable_path, AppConfig, InstallationStatus};

/// Print the installation status; non-zero unless it is usable as is.
pub fn check(cfg: &AppConfig) -> i32 {
    let status = check_installation(&cfg.server.dir, cfg.server.expected_version.as_deref());
    let exe = executable_path(&cfg.server);

    println!("server dir : {}", cfg.server.dir.display());
    println!("executable : {} ({})", exe.display(), if exe.is_file() { "present" } else { "missing" });
    println!("status     : {status}");

    match status {
        InstallationStatus::UpToDate { .. } if exe.is_file() => 0,
        _ => 1,
    }
}
