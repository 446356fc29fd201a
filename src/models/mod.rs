mod api_key;
mod budget;
mod model_pricing;
mod session_token;
mod token_gen;
mod usage;
mod user;

pub use api_key::*;
pub use budget::*;
pub use model_pricing::*;
pub use session_token::*;
pub use token_gen::*;
pub use usage::*;
pub use user::*;
