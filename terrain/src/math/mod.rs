mod haversine;

pub use haversine::{bearing, destination, distance, RayIter};
