mod pipeline_profiles;

pub use pipeline_profiles::get_pipeline_profile;
