//! Remote sources behind the engine's source traits.

mod common;
mod decentralization;
mod overpass;
mod wikidata;

pub use decentralization::DecentralizationClient;
pub use overpass::OverpassClient;
pub use wikidata::WikidataClient;
