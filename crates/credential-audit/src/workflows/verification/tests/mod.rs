mod common;
mod facade;
