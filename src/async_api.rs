use crate::download::DownloadSink;
use crate::events::{Command, Event, EventSender};
use crate::panel::{LogView, PanelState};
use crate::readiness::DelayTime;
use crate::session::{Session, SessionOptions};
use crate::surface::ViewerSurface;
use crate::sweep::SweepReport;
use crate::{Error, HarvestConfig, Result};
use log::error;
use std::thread;
use tokio::sync::oneshot;

/// A session running on a dedicated worker thread.
///
/// The worker thread builds and owns the viewer backend, so the backend never
/// has to be `Send`. Async callers talk to it through a [`HarvesterHandle`].
pub struct Harvester {
    handle: HarvesterHandle,
    finished: oneshot::Receiver<Result<()>>,
}

/// Cloneable command handle for a running [`Harvester`]
#[derive(Clone)]
pub struct HarvesterHandle {
    events: EventSender,
}

/// What a backend factory builds on the worker thread
pub type Backend<V> = (V, Box<dyn DownloadSink>);

impl Harvester {
    /// Spawn the worker, build the backend on it and attach the session.
    pub async fn spawn<V, F>(config: HarvestConfig, build: F) -> Result<Self>
    where
        V: ViewerSurface + 'static,
        F: FnOnce(&HarvestConfig) -> Result<Backend<V>> + Send + 'static,
    {
        let options = SessionOptions::from_config(&config);
        Self::spawn_with(config, options, build).await
    }

    /// Like [`Harvester::spawn`] with explicit session options
    pub async fn spawn_with<V, F>(config: HarvestConfig, options: SessionOptions, build: F) -> Result<Self>
    where
        V: ViewerSurface + 'static,
        F: FnOnce(&HarvestConfig) -> Result<Backend<V>> + Send + 'static,
    {
        let (init_tx, init_rx) = oneshot::channel::<Result<EventSender>>();
        let (done_tx, done_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            // Initialize the backend on the worker thread
            let (mut viewer, mut sink) = match build(&config) {
                Ok(backend) => backend,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let mut session = Session::new(options);
            let mut view = LogView;
            if let Err(err) = session.attach(&mut viewer, &mut view) {
                let _ = init_tx.send(Err(err));
                return;
            }

            let _ = init_tx.send(Ok(session.sender()));

            let res = session.run(&mut viewer, sink.as_mut(), &mut view);
            if let Err(ref e) = res {
                error!("Session ended with error: {}", e);
            }
            let _ = done_tx.send(res);
        });

        let events = init_rx.await.map_err(|_| Error::WorkerGone)??;
        Ok(Self { handle: HarvesterHandle { events }, finished: done_rx })
    }

    pub fn handle(&self) -> HarvesterHandle {
        self.handle.clone()
    }

    /// Wait for the session loop to stop
    pub async fn wait(self) -> Result<()> {
        self.finished.await.map_err(|_| Error::WorkerGone)?
    }
}

impl HarvesterHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        if !self.events.try_emit(Event::Command(make(tx))) {
            return Err(Error::WorkerGone);
        }
        rx.await.map_err(|_| Error::WorkerGone)
    }

    /// Press the action trigger and wait for the sweep to finish
    pub async fn start(&self) -> Result<SweepReport> {
        self.request(|tx| Command::Start(Some(tx))).await?
    }

    /// Edit the delay field (seconds, as typed)
    pub async fn set_delay(&self, seconds: &str) -> Result<DelayTime> {
        let text = seconds.to_string();
        self.request(|tx| Command::SetDelay(text, Some(tx))).await?
    }

    pub async fn set_volume_name(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.request(|tx| Command::SetVolumeName(name, Some(tx))).await
    }

    pub async fn status(&self) -> Result<PanelState> {
        self.request(|tx| Command::Status(Some(tx))).await
    }

    /// Ask the session to stop; a running sweep finishes first
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|tx| Command::Shutdown(Some(tx))).await
    }

    /// Raw access for feeding events (for example from a page binding)
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::download::MemorySink;
    use crate::virtual_viewer::VirtualViewer;
    use std::sync::Arc;

    fn options() -> SessionOptions {
        SessionOptions::default().with_clock(Arc::new(ManualClock::new()))
    }

    #[tokio::test]
    async fn backend_failure_is_reported() {
        let res = Harvester::spawn_with(HarvestConfig::default(), options(), |_| -> Result<Backend<VirtualViewer>> {
            Err(Error::InitializationError("no browser".into()))
        })
        .await;
        assert!(matches!(res, Err(Error::InitializationError(_))));
    }

    #[tokio::test]
    async fn commands_round_trip() {
        let sink = MemorySink::new();
        let worker_sink = sink.clone();
        let harvester = Harvester::spawn_with(HarvestConfig::default(), options(), move |_| {
            Ok((VirtualViewer::new(4).with_title("Async Vol"), Box::new(worker_sink) as Box<dyn DownloadSink>))
        })
        .await
        .unwrap();
        let h = harvester.handle();

        assert!(h.status().await.unwrap().button.enabled);
        assert!(h.set_delay("25").await.is_err());
        assert!(!h.status().await.unwrap().button.enabled);
        assert_eq!(h.set_delay("3").await.unwrap().as_millis(), 3000);

        h.set_volume_name("Renamed").await.unwrap();
        let report = h.start().await.unwrap();
        assert_eq!(report.exported, 4);
        assert_eq!(sink.file_names()[3], "Renamed  Page 4.jpg");
        assert_eq!(h.status().await.unwrap().button.label, "Download Complete!");

        h.shutdown().await.unwrap();
        harvester.wait().await.unwrap();
        assert!(matches!(h.status().await, Err(Error::WorkerGone)));
    }
}
