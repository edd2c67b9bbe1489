mod options;

pub use options::{
    ContextOptions, BUSY_TIMEOUT_ENV, DATABASE_URL_ENV, ENSURE_CREATED_ENV, MAX_CONNECTIONS_ENV,
};
