//! Stdout replacements for the `log` macros. Enabled by the `log-to-stdout` feature
//! for hosts which capture the client stdout instead of installing a logger

#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => (println!("[caplink] Error: {}", format!($($arg)+)))
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => (println!("[caplink] Warning: {}", format!($($arg)+)))
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => (println!("[caplink] Info: {}", format!($($arg)+)))
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => (println!("[caplink] Debug: {}", format!($($arg)+)))
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => (println!("[caplink] Trace: {}", format!($($arg)+)))
}
