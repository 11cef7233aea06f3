use tokio::sync::watch;

/// Sender half of the shutdown notification channel.
///
/// The channel carries unit values; subscribers only care that a change
/// happened, not what was sent.
pub type ShutdownTx = watch::Sender<()>;

/// Receiver half of the shutdown notification channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates the shutdown channel a pipeline and its stage runs share.
///
/// Every in-flight stage subscribes via [`ShutdownTx::subscribe`]; sending on
/// the channel cancels all of them.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(())
}
