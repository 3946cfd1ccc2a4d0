use midir::{MidiOutput, MidiOutputConnection};

use crate::emit::{NoteEvent, NoteSink};

/// Fixed gate time before the matching note-off goes out.
const GATE_US: u64 = 120_000;

/// Sends note batches to a MIDI output. Each grid column maps to its own
/// MIDI channel so downstream gear can give columns distinct voices.
/// Note-offs are queued a fixed gate time after the note-on and drained on
/// the scheduler's clock ticks.
pub struct MidiNoteSink {
    conn: MidiOutputConnection,
    now_us: u64,
    hanging: Vec<(u64, u8, u8)>,
}

impl MidiNoteSink {
    /// Open a MIDI output whose port name contains `device_filter`.
    pub fn open(device_filter: &str) -> anyhow::Result<Self> {
        let midi_out = MidiOutput::new("padcafe")?;
        let ports = midi_out.ports();

        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|n| n.contains(device_filter))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow::anyhow!("MIDI output not found: {device_filter}"))?;

        let name = midi_out.port_name(port).unwrap_or_else(|_| "Unknown".into());
        let conn = midi_out
            .connect(port, "padcafe-notes")
            .map_err(|e| anyhow::anyhow!("Failed to open MIDI output {name}: {e}"))?;
        log::info!("Opened MIDI output: {name}");

        Ok(MidiNoteSink {
            conn,
            now_us: 0,
            hanging: Vec::new(),
        })
    }

    fn send_off(&mut self, channel: u8, pitch: u8) {
        if let Err(e) = self.conn.send(&[0x80 | channel, pitch, 0]) {
            log::warn!("MIDI send failed: {e}");
        }
    }
}

impl NoteSink for MidiNoteSink {
    fn emit(&mut self, batch: &[NoteEvent]) {
        for event in batch {
            if !(0..=127).contains(&event.pitch) {
                log::debug!("pitch {} out of MIDI range, dropped", event.pitch);
                continue;
            }
            let pitch = event.pitch as u8;
            let channel = (event.column % 16) as u8;
            let velocity = (event.velocity.clamp(0.0, 1.0) * 126.0) as u8 + 1;

            // Retrigger: close a still-gated copy of the same note first.
            if let Some(i) = self
                .hanging
                .iter()
                .position(|&(_, ch, p)| ch == channel && p == pitch)
            {
                self.hanging.swap_remove(i);
                self.send_off(channel, pitch);
            }

            if let Err(e) = self.conn.send(&[0x90 | channel, pitch, velocity]) {
                log::warn!("MIDI send failed: {e}");
            }
            self.hanging.push((self.now_us + GATE_US, channel, pitch));
        }
    }

    /// Advance the gate clock and release any notes whose gate elapsed.
    fn tick(&mut self, now_us: u64) {
        self.now_us = now_us;
        let mut i = 0;
        while i < self.hanging.len() {
            if self.hanging[i].0 <= now_us {
                let (_, channel, pitch) = self.hanging.swap_remove(i);
                self.send_off(channel, pitch);
            } else {
                i += 1;
            }
        }
    }
}

impl Drop for MidiNoteSink {
    fn drop(&mut self) {
        // Don't leave notes ringing past shutdown.
        let hanging: Vec<_> = self.hanging.drain(..).collect();
        for (_, channel, pitch) in hanging {
            self.send_off(channel, pitch);
        }
    }
}

/// Fallback sink when no MIDI output is configured: notes go to the log.
pub struct LogSink;

impl NoteSink for LogSink {
    fn emit(&mut self, batch: &[NoteEvent]) {
        for event in batch {
            log::info!(
                "note pitch={} col={} vel={:.2}",
                event.pitch,
                event.column,
                event.velocity
            );
        }
    }
}
