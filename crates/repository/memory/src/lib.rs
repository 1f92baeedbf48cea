pub mod fault;
pub mod store;

pub use fault::FaultPlan;
pub use store::MemoryRepository;
