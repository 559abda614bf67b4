#![no_std]
//! Shared building blocks for the PDC driver service: logging macros and synchronization primitives

mod fmt;

pub mod event;

/// Mutex type used for state shared between tasks and interrupt handlers
pub type GlobalRawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
