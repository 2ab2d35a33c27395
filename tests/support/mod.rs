#![allow(dead_code)]

pub mod cache;
pub mod digitboost_env;
