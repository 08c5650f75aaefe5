/// Receives the redirect-to-login side effect after an unrecoverable
/// authentication failure.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Navigator that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self) {}
}

impl<F> Navigator for F
where
    F: Fn() + Send + Sync,
{
    fn redirect_to_login(&self) {
        self()
    }
}
