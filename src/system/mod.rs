pub mod backend;
pub mod cache;
pub mod cpu;
pub mod native_lib;
pub mod platform;
pub mod poller;
pub mod privilege;
pub mod process;
pub mod provider;
pub mod rate;
pub mod snapshot;
pub mod terminate;
