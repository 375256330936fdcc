/// ML модели

pub mod direction;
pub mod sales;
pub mod survival;

pub use direction::DirectionModel;
pub use sales::SalesModel;
pub use survival::SurvivalModel;
