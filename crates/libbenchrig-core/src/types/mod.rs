pub mod run;
pub mod step;
