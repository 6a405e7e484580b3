pub mod environment_repo;

pub use environment_repo::EnvironmentRepo;
