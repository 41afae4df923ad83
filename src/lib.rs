// ==============================================================================
// lib.rs - HLA Typing Report Library
// ==============================================================================
// Description: Library interface for HLA typing QC, reporting and
//              cross-patient consolidation modules
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod parsers;
pub mod audit;
pub mod validator;
pub mod models;
pub mod qc;
pub mod report;
pub mod workbook;
pub mod export;
pub mod consolidate;
pub mod concatenate;
pub mod config;
pub mod session;
