// handlers/elevated/mod.rs - Elevated handlers (approver roles)
//
// Route Prefix: /api/admin/*
// Role checks happen in the provisioning engine: admin and college_admin act
// within their tenant, super_admin across tenants.

pub mod admin; // Review queue and decisions
