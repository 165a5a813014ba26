//! ECMA-335 metadata: encoding, the emitter and a reader for produced images.
//!
//! # Key Components
//!
//! - [`builder`] - [`builder::AssemblyBuilder`], the row-level emitter the importer drives
//! - [`writer`] - `#~` stream, heaps and PE32 image serialization
//! - [`reader`] - [`reader::AssemblyImage`], decoding of written or referenced assemblies
//! - [`tables`] - table identifiers, the column schema, coded indices and typed rows
//! - [`heaps`] - `#Strings`, `#Blob`, `#GUID` builders and views
//! - [`signatures`] / [`marshalling`] / [`customattributes`] - blob encodings
//! - [`identity`] / [`strongname`] - assembly names and strong-name keys
//! - [`token`] - metadata tokens
//!
//! # Examples
//!
//! ```rust
//! use tlbscope::metadata::{
//!     builder::AssemblyBuilder,
//!     identity::{AssemblyIdentity, AssemblyVersion},
//!     reader::AssemblyImage,
//! };
//!
//! let mut builder = AssemblyBuilder::new();
//! builder.begin_assembly(&AssemblyIdentity::new("Interop.Empty", AssemblyVersion::new(1, 0, 0, 0)))?;
//! builder.define_module("Interop.Empty.dll")?;
//!
//! let image = AssemblyImage::from_bytes(builder.to_bytes()?)?;
//! assert_eq!(image.identity()?.map(|id| id.name), Some("Interop.Empty".to_string()));
//! # Ok::<(), tlbscope::Error>(())
//! ```

/// Row-level assembly emitter
pub mod builder;
/// The CLI header
pub mod cor20header;
/// Custom attribute value blobs
pub mod customattributes;
/// Attribute and flag constants of the metadata tables
pub mod flags;
/// Metadata heaps
pub mod heaps;
/// Assembly names
pub mod identity;
/// Native type descriptors for `FieldMarshal`
pub mod marshalling;
/// Reading produced and referenced images
pub mod reader;
/// The metadata root
pub mod root;
/// Type, method, field and property signatures
pub mod signatures;
/// Strong-name keys and public key tokens
pub mod strongname;
/// Metadata tables
pub mod tables;
/// Metadata tokens
pub mod token;
/// Stream and PE image serialization
pub mod writer;
