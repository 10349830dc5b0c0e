#![no_std]

pub mod env;
pub mod instrumentation;
pub mod markers;
pub mod settings;
