pub mod evaluate;
pub mod orders;
pub mod run;
pub mod simulate;
