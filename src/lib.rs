#![doc = include_str!("../README.md")]

pub mod natives;

pub use natives::{
    NativesPlugin,
    TransformOutput,
    config::{Config, ConfigFile, DeliveryMode, NameOverride, Target},
    registry::{BinaryIdentity, VIRTUAL_PREFIX},
    state::{Warning, WarningKind},
};
