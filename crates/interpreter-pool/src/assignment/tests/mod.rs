mod common;
mod policy;
mod scheduler;
mod scoring;
