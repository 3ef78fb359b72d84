pub mod analysis;
pub mod app;
pub mod braille;
pub mod chat;
pub mod config;
pub mod controller;
pub mod data;
pub mod economy;
pub mod gemini;
pub mod map;
pub mod ui;
