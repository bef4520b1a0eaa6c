/// Application name
pub const APP_NAME: &str = "POI Manager";

/// Maximum point title length, in characters
pub const MAX_TITLE_LEN: usize = 100;

/// Degrees of longitude per kilometre of radius used by the planar
/// pre-filter. Calibrated for the latitude band around 60 degrees north,
/// where it is roughly two kilometres north-south per kilometre of radius.
pub const GEO_DEGREES_PER_KM: f64 = 0.018;

/// Sphere radius used for geodesic distance, in metres
pub const EARTH_RADIUS_METERS: f64 = 6_378_168.0;

/// Query parameter carrying the geographic filter
pub const GEO_FIELD: &str = "geo";

/// Codename of the moderator permission on points
pub const CHANGE_POINT_CODENAME: &str = "points.change_point";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
