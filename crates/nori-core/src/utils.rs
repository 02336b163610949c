use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use chrono::Local;

pub const LOG_FILE: &str = "logs.txt";

/// Returns the nori home directory. Uses NORI_HOME if set; otherwise ~/.nori.
pub fn get_nori_home() -> PathBuf {
    if let Ok(dir) = env::var("NORI_HOME") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nori")
}

fn is_quiet() -> bool {
    if env::var("NORI_QUIET").map(|v| v == "1" || v == "true").unwrap_or(false) {
        return true;
    }
    env::var("NORI_LOG")
        .map(|v| v.to_lowercase() == "quiet" || v.to_lowercase() == "error")
        .unwrap_or(false)
}

fn append_to_log_file(line: &str) {
    let home = get_nori_home();
    if fs::create_dir_all(&home).is_err() {
        return;
    }
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(home.join(LOG_FILE))
    {
        let _ = writeln!(file, "{}", line);
    }
}

fn stamp(message: &str) -> String {
    format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message)
}

pub fn log(message: &str) {
    let line = stamp(message);
    if !is_quiet() {
        println!("{}", line);
    }
    append_to_log_file(&line);
}

/// Non-fatal problem: always shown on stderr, also recorded in the log file.
pub fn log_warning(message: &str) {
    let line = stamp(&format!("warning: {}", message));
    eprintln!("{}", line);
    append_to_log_file(&line);
}

pub fn log_error(message: &str) {
    eprintln!("{}", message);
    append_to_log_file(&stamp(&format!("error: {}", message)));
}

/// Registry URLs are compared without trailing slashes.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

pub fn same_url(a: &str, b: &str) -> bool {
    normalize_url(a) == normalize_url(b)
}
