//! Integration tests for soulstore

mod adapter_commands;
mod warm_start;
