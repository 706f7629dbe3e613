//! External registration pipeline boundary.
//!
//! Registration itself (global affine, then block-wise deformable
//! alignment) is performed by an external pipeline. This module defines
//! what goes in and what comes out, and checks the outputs afterwards.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     PipelineInvoker                       │
//! │  1. Validate request     4. Verify affine on disk         │
//! │  2. Create write dir     5. Open deformation field        │
//! │  3. Call pipeline        6. Open aligned volume (lazy)    │
//! └──────────────────────────────┬────────────────────────────┘
//!                                │ register()
//!                                ▼
//!                 ┌──────────────────────────────┐
//!                 │ RegistrationPipeline Trait   │
//!                 └──────────────┬───────────────┘
//!                                │
//!                                ▼
//!                 ┌──────────────────────────────┐
//!                 │       CommandPipeline        │
//!                 │ (JSON on stdin / stdout)     │
//!                 └──────────────────────────────┘
//! ```

mod affine;
mod blocks;
mod cluster;
mod command;
mod invoker;
mod request;

use async_trait::async_trait;

use crate::error::PipelineError;

pub use affine::AffineTransform;
pub use blocks::{BlockGrid, BlockRegion, DEFAULT_OVERLAP_FACTOR};
pub use cluster::ClusterConfig;
pub use command::{parse_response, CommandPipeline};
pub use invoker::{PipelineInvoker, RegistrationResult};
pub use request::{PipelineOutput, RegistrationRequest, RequestDocument, VolumeDescriptor};

/// An affine + deformable registration implementation.
///
/// Implementations must leave the affine and the deformation field under
/// `request.write_directory` (or wherever the returned [`PipelineOutput`]
/// points) before returning.
#[async_trait]
pub trait RegistrationPipeline: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Register the moving dataset onto the fixed one.
    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<PipelineOutput, PipelineError>;
}
