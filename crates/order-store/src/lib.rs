pub mod cache;
pub mod error;
pub mod memory;
pub mod repository;

pub use cache::OrderCache;
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderRepository;
pub use repository::{OrderRepository, OrderRepositoryExt};
