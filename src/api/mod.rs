//! Backend and weather API access.
//!
//! This module provides:
//! - The HTTP transport seam and its `reqwest` implementation
//! - The authenticated client with in-band status normalization
//! - Typed endpoints for login, SOS, machine data and weather

pub mod auth;
pub mod client;
mod de;
pub mod envelope;
pub mod error;
pub mod machines;
pub mod sos;
pub mod transport;
pub mod weather;

pub use auth::{LoginCredentials, LoginGrant, LoginResponse};
pub use client::{ApiCall, ApiClient};
pub use envelope::Envelope;
pub use error::{ApiError, ApiResult};
pub use machines::{MachineLog, MachineReading};
pub use sos::{SosReceipt, SosReport, SosSubmission};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError};
pub use weather::{WeatherClient, WeatherReport};
