//! Error taxonomy and the raw failure envelope.
//!
//! # Kinds and default severities
//!
//! | Kind         | Severity | Assigned when                                  |
//! |--------------|----------|------------------------------------------------|
//! | `network`    | high     | `NetworkError` / `TypeError` failures          |
//! | `timeout`    | medium   | `TimeoutError` or message mentions `timeout`   |
//! | `server`     | high     | status >= 500                                  |
//! | `not_found`  | medium   | status 404                                     |
//! | `permission` | high     | status 401 or 403                              |
//! | `api`        | medium   | any other status                               |
//! | `validation` | low      | validation payload or errors collection        |
//! | `unknown`    | medium   | nothing else matched                           |

pub mod failure;
pub mod taxonomy;

pub use failure::{AsFailure, Failure, FailureName};
pub use taxonomy::{Classification, ErrorKind, ParseTaxonomyError, Severity};
