/// Errors that can occur during point set registration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// The inputs cannot be registered, e.g. an empty point cloud.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The correspondence filter rejected every match.
    #[error("No correspondences accepted at iteration {iteration}")]
    NoCorrespondences {
        /// The iteration at which the correspondence set became empty.
        iteration: usize,
    },

    /// The closed-form solve did not produce a usable eigenpair.
    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    /// The caller requested to stop the registration.
    #[error("Registration cancelled at iteration {iteration}")]
    Cancelled {
        /// The iteration at which the cancellation was observed.
        iteration: usize,
    },
}
