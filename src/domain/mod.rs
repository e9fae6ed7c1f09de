//! Domain layer: entities, errors, events, ports, and the cache engine.

/// Cache engine: Loader, Network, Image, RenderRequest, Bucket, Controller.
pub mod engine;
/// Entity definitions (ids, sizes).
pub mod entities;
/// Error types.
pub mod errors;
/// Tagged-variant event buses for each entity.
pub mod events;
/// Port definitions (external collaborators: transport, decoder).
pub mod ports;
