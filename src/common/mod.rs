mod proj;

pub use proj::Projection;
