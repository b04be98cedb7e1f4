pub mod annotate_apertures;
pub mod detect_sources;
pub mod photometry;
pub mod read_fits;

pub use annotate_apertures::annotate_apertures;
pub use detect_sources::detect;
pub use photometry::photometry;
pub use read_fits::read_fits;
