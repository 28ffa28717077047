pub mod merge;
pub mod nominations;
pub mod tracks;

pub use merge::merge_datasets;
pub use nominations::transform_nominations;
pub use tracks::transform_tracks;
