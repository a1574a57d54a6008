//! Pressroom: template bundle intake and PDF rendering service.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
