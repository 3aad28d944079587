// src/error.rs
//
// Unified error handling for ips
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input or configuration, recoverable
// - CodecError: PNG decode/encode issues
// - ResourceLimit: Dimension limits, I/O, thread creation
// - ProcessingError: A single tile or pass went wrong, the frame survives
// - InternalBug: Scheduler misuse or library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by the frame driver to decide what to do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Memory/dimension/OS limits
    ResourceLimit,
    /// Per-tile or per-pass processing problems
    ProcessingError,
    /// Library bugs or scheduler contract violations
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserError => "user_error",
            Self::CodecError => "codec_error",
            Self::ResourceLimit => "resource_limit",
            Self::ProcessingError => "processing_error",
            Self::InternalBug => "internal_bug",
        }
    }
}

/// ips error types
#[derive(Debug, Error)]
pub enum IpsError {
    // File I/O Errors
    #[error("File not found: {path}")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to memory-map file '{path}': {source}")]
    MmapFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Codec Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Image layout errors
    #[error("Invalid image layout {width}x{height}x{channels}: buffer holds {len} bytes")]
    InvalidImageLayout {
        width: u32,
        height: u32,
        channels: u8,
        len: usize,
    },

    #[error("Unsupported channel count {channels}. Expected 3 (RGB) or 4 (RGBA)")]
    UnsupportedChannelCount { channels: u8 },

    // Scheduling Errors
    #[error("Invalid task range [{start}, {end}) for image height {height}")]
    InvalidTaskRange { start: u32, end: u32, height: u32 },

    #[error(
        "Image dimension mismatch: input {input_width}x{input_height}x{input_channels}, \
         output {output_width}x{output_height}x{output_channels}"
    )]
    DimensionMismatch {
        input_width: u32,
        input_height: u32,
        input_channels: u8,
        output_width: u32,
        output_height: u32,
        output_channels: u8,
    },

    #[error("Transform '{transform}' failed on rows [{start_row}, {end_row}): {message}")]
    TransformFailure {
        transform: Cow<'static, str>,
        start_row: u32,
        end_row: u32,
        message: Cow<'static, str>,
    },

    #[error("Task from epoch {task_epoch} is stale (current epoch {current_epoch})")]
    StaleEpoch { task_epoch: u64, current_epoch: u64 },

    #[error("Pass {pass} transform '{transform}' needs upstream statistics but none were supplied")]
    MissingReduction {
        pass: u32,
        transform: Cow<'static, str>,
    },

    // Configuration Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Worker pool Errors
    #[error("Worker pool is {actual}, expected {expected}")]
    InvalidPoolState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Failed to spawn worker thread {index}: {source}")]
    WorkerSpawnFailed {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl IpsError {
    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn mmap_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_image_layout(width: u32, height: u32, channels: u8, len: usize) -> Self {
        Self::InvalidImageLayout {
            width,
            height,
            channels,
            len,
        }
    }

    pub fn unsupported_channel_count(channels: u8) -> Self {
        Self::UnsupportedChannelCount { channels }
    }

    pub fn invalid_task_range(start: u32, end: u32, height: u32) -> Self {
        Self::InvalidTaskRange { start, end, height }
    }

    /// Build a mismatch error from `(width, height, channels)` triples.
    pub fn dimension_mismatch(input: (u32, u32, u8), output: (u32, u32, u8)) -> Self {
        Self::DimensionMismatch {
            input_width: input.0,
            input_height: input.1,
            input_channels: input.2,
            output_width: output.0,
            output_height: output.1,
            output_channels: output.2,
        }
    }

    pub fn transform_failure(
        transform: impl Into<Cow<'static, str>>,
        start_row: u32,
        end_row: u32,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::TransformFailure {
            transform: transform.into(),
            start_row,
            end_row,
            message: message.into(),
        }
    }

    pub fn stale_epoch(task_epoch: u64, current_epoch: u64) -> Self {
        Self::StaleEpoch {
            task_epoch,
            current_epoch,
        }
    }

    pub fn missing_reduction(pass: u32, transform: impl Into<Cow<'static, str>>) -> Self {
        Self::MissingReduction {
            pass,
            transform: transform.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_pool_state(expected: &'static str, actual: &'static str) -> Self {
        Self::InvalidPoolState { expected, actual }
    }

    pub fn worker_spawn_failed(index: usize, source: std::io::Error) -> Self {
        Self::WorkerSpawnFailed { index, source }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it or the next frame will)
    ///
    /// This method is consistent with category():
    /// - UserError, ResourceLimit and ProcessingError are recoverable
    /// - CodecError and InternalBug are not
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError
            | ErrorCategory::ResourceLimit
            | ErrorCategory::ProcessingError => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Errors that abort a pass submission and therefore the current frame.
    pub fn is_frame_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidTaskRange { .. }
                | Self::DimensionMismatch { .. }
                | Self::MissingReduction { .. }
        )
    }

    /// Stale work is dropped without any report.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::StaleEpoch { .. })
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FileNotFound { .. } | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::InvalidImageLayout { .. }
            | Self::UnsupportedChannelCount { .. } => ErrorCategory::CodecError,

            // Note: I/O failures are classified as ResourceLimit because they usually
            // indicate permissions, disk or descriptor limits the user can fix.
            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::FileReadFailed { .. }
            | Self::MmapFailed { .. }
            | Self::FileWriteFailed { .. }
            | Self::WorkerSpawnFailed { .. } => ErrorCategory::ResourceLimit,

            Self::TransformFailure { .. } | Self::StaleEpoch { .. } => {
                ErrorCategory::ProcessingError
            }

            Self::InvalidTaskRange { .. }
            | Self::DimensionMismatch { .. }
            | Self::MissingReduction { .. }
            | Self::InvalidPoolState { .. }
            | Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}
