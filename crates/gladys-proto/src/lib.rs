//! Generated tonic/prost bindings, organized by proto package.
//!
//! The module hierarchy matches the proto package hierarchy:
//! - gladys.types -> gladys::types
//! - gladys.memory -> gladys::memory
//! - gladys.orchestrator -> gladys::orchestrator
//! - gladys.executive -> gladys::executive

pub mod gladys {
    /// Shared types from types.proto (package gladys.types)
    pub mod types {
        tonic::include_proto!("gladys.types");
    }
    /// Memory service from memory.proto (package gladys.memory)
    pub mod memory {
        tonic::include_proto!("gladys.memory");
    }
    /// Orchestrator service from orchestrator.proto (package gladys.orchestrator)
    pub mod orchestrator {
        tonic::include_proto!("gladys.orchestrator");
    }
    /// Executive service from executive.proto (package gladys.executive)
    pub mod executive {
        tonic::include_proto!("gladys.executive");
    }
}

pub use gladys::executive;
pub use gladys::memory;
pub use gladys::orchestrator;
pub use gladys::types;
