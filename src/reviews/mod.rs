pub mod domain;
pub mod helpful;
pub mod rating;
pub mod repository;
pub mod responses;
