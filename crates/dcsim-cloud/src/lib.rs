#![doc = include_str!("../readme.md")]

pub mod core;
pub mod report;
pub mod simulation;
