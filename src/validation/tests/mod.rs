// src/validation/tests/mod.rs
