pub mod avatar;
pub mod domain;
pub mod repository;
