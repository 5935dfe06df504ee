use forge_core::config::{self, ForgeConfig};
use forge_core::{Bridge, Credential, HostBlock, RealtimeProcessor, WakeFlag};
use nih_plug::prelude::*;
use std::sync::{Arc, PoisonError, RwLock};

pub struct Forge {
    params: Arc<ForgeParams>,
    bridge: Bridge,
    processor: RealtimeProcessor,
}

#[derive(Params)]
struct ForgeParams {
    /// Stored by the host with the rest of the plugin state.
    #[persist = "api-key"]
    api_key: Arc<RwLock<Credential>>,
}

impl Default for ForgeParams {
    fn default() -> Self {
        Self {
            api_key: Arc::new(RwLock::new(Credential::default())),
        }
    }
}

/// Work run on the GUI thread, which doubles as the message thread.
pub enum ForgeTask {
    /// A job left a result in the mailbox.
    DrainResult,
    /// A capture ended and used up reserved storage.
    ReplenishCapture,
}

impl Default for Forge {
    fn default() -> Self {
        let cfg = config::load_config();
        let client = forge_core::suno::client_from_config(&cfg);
        let (bridge, processor) = Bridge::new(client, cfg, Arc::new(WakeFlag::new()));
        Self {
            params: Arc::new(ForgeParams::default()),
            bridge,
            processor,
        }
    }
}

/// Output does not follow input: a result can arrive while the host feeds
/// silence, and waking the message thread needs `process` to keep running.
const PROCESS_STATUS: ProcessStatus = ProcessStatus::KeepAlive;

/// The persisted credential wins; the config file's key covers fresh instances.
fn initial_credential(persisted: &Credential, cfg: &ForgeConfig) -> String {
    if !persisted.is_empty() {
        return persisted.as_str().trim().to_string();
    }
    cfg.api_key.as_deref().unwrap_or_default().trim().to_string()
}

impl Plugin for Forge {
    const NAME: &'static str = "Forge";
    const VENDOR: &'static str = "Forge";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(2),
        main_output_channels: NonZeroU32::new(2),
        ..AudioIOLayout::const_default()
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const MIDI_OUTPUT: MidiConfig = MidiConfig::None;

    type SysExMessage = ();
    type BackgroundTask = ForgeTask;

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn task_executor(&mut self) -> TaskExecutor<Self> {
        let bridge = self.bridge.clone();
        Box::new(move |task| match task {
            ForgeTask::DrainResult => {
                bridge.handle_result();
            }
            ForgeTask::ReplenishCapture => bridge.segments().replenish(),
        })
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        self.bridge.prepare(buffer_config.sample_rate);

        let persisted = self
            .params
            .api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let key = initial_credential(&persisted, self.bridge.config());
        if !key.is_empty() {
            nih_log!("restoring API credential");
        }
        self.bridge.set_credential(&key);
        true
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let transport = context.transport();
        let block = HostBlock {
            is_playing: transport.playing,
            bpm: transport.tempo,
            sample_rate: transport.sample_rate,
        };

        let events = self.processor.process(buffer.as_slice(), block);
        if events.needs_replenish() {
            context.execute_gui(ForgeTask::ReplenishCapture);
        }
        if events.result_ready {
            context.execute_gui(ForgeTask::DrainResult);
        }

        PROCESS_STATUS
    }
}

impl ClapPlugin for Forge {
    const CLAP_ID: &'static str = "com.forge.forge";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Generate and transform audio with a remote AI music service");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Sampler,
        ClapFeature::Stereo,
    ];
}

impl Vst3Plugin for Forge {
    const VST3_CLASS_ID: [u8; 16] = *b"ForgeAIGenBridge";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Generator,
    ];
}

nih_export_clap!(Forge);
nih_export_vst3!(Forge);
