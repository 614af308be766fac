use crate::Environment;

/// API host for the given environment.
pub(crate) const fn api_base(environment: &Environment) -> &'static str {
    match environment {
        Environment::Sandbox => "https://api.sandbox.paymentkit.dev",
        Environment::Production => "https://api.paymentkit.dev",
    }
}
