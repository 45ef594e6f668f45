pub mod config;
pub mod diary;
