#![allow(dead_code)]

pub mod acc_monitor;
pub mod fake_host;
