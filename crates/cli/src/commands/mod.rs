pub mod heartbeat;
pub mod init;
pub mod run;
pub mod schedule;
