pub mod plugins;
pub mod run;
pub mod serve;
pub mod task;
