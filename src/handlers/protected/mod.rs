// handlers/protected/mod.rs - Protected handlers (caller identity required)
//
// Route Prefix: /api/requests/*
// Middleware: identity_middleware attaches the caller's Identity

pub mod requests; // Student-facing request lifecycle and inspection
