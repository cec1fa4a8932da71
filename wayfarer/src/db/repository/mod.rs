mod cities;
mod pois;
mod sessions;

pub use cities::CityRepository;
pub use pois::PoiRepository;
pub use sessions::SessionRepository;
