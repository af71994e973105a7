// Scan stages
//
// Default order: reconnaissance, http_probe, fingerprint (full mode only),
// classification.

pub mod classification_stage;
pub mod fingerprint_stage;
pub mod http_probe_stage;
pub mod reconnaissance_stage;

pub use classification_stage::ClassificationStage;
pub use fingerprint_stage::FingerprintStage;
pub use http_probe_stage::HttpProbeStage;
pub use reconnaissance_stage::ReconnaissanceStage;
