pub mod acquisition;
pub mod features_csv;
pub mod text;
