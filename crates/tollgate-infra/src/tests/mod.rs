//! Limiter scenarios run against the in-memory store on a manual clock.

mod stats;
mod support;
