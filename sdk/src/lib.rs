//! Encrypts a byte stream on the fly and uploads it to a storage endpoint.
//!
//! [`NetworkFacade::upload_from_stream`] is the entry point. Registering the uploaded
//! object in a [`Catalog`] is a separate step performed by the caller.

pub mod abort;
pub mod catalog;
pub mod crypto;
pub mod error;
pub mod progress;
pub mod server;
pub mod signal;
pub mod transfer;
pub mod upload;

pub use crate::{
    abort::AbortHandle,
    catalog::{Catalog, HttpCatalog, RegistrationError},
    error::UploadError,
    progress::{Phase, ProgressCallback, ProgressReporter, ProgressWeights},
    signal::{InterruptGuard, interrupted},
    transfer::{TransferClient, TransferDescriptor, TransferOptions},
    upload::{
        BucketEndpoint, NetworkFacade, TargetResolver, UploadHandle, UploadPipeline, UploadResult,
        UploadState,
    },
};
