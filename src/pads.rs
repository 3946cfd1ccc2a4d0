use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::led::{FrameBuffer, GRID_COLS, GRID_ROWS, PadColor};

/// A cell event from the input surface. Edges are press/release
/// transitions (`value == 0.0` is the release); values are continuous
/// pressure updates on an already-held cell.
#[derive(Debug, Clone, Copy)]
pub enum CellEvent {
    Edge { row: usize, col: usize, value: f32 },
    Value { row: usize, col: usize, value: f32 },
}

/// Launchpad-style session layout: pads are numbered in rows of ten from
/// the bottom-left, note 11. Our 6x8 grid sits on the bottom six rows,
/// grid row 0 at the top.
fn note_to_cell(note: u8) -> Option<(usize, usize)> {
    let d = note.checked_sub(11)? as usize;
    let (pad_row, col) = (d / 10, d % 10);
    if col < GRID_COLS && pad_row < GRID_ROWS {
        Some((GRID_ROWS - 1 - pad_row, col))
    } else {
        None
    }
}

fn cell_to_note(row: usize, col: usize) -> u8 {
    (11 + 10 * (GRID_ROWS - 1 - row) + col) as u8
}

/// Launchpad RGB palette indices.
fn color_code(color: Option<PadColor>) -> u8 {
    match color {
        Some(PadColor::Primary) => 5,    // red
        Some(PadColor::Secondary) => 9,  // amber
        None => 0,
    }
}

/// A hardware pad controller: decodes pad presses into `CellEvent`s on a
/// channel (the MIDI callback runs on midir's thread; the engine only ever
/// sees the channel), and renders the logical frame buffer back to the
/// pad LEDs.
pub struct PadGrid {
    // Held for the lifetime of the callback.
    _input: MidiInputConnection<()>,
    output: MidiOutputConnection,
    last_frame: [[u8; GRID_COLS]; GRID_ROWS],
}

impl PadGrid {
    pub fn open(device_filter: &str, sender: Sender<CellEvent>) -> anyhow::Result<Self> {
        let midi_in = MidiInput::new("padcafe")?;
        let in_port = midi_in
            .ports()
            .into_iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map(|n| n.contains(device_filter))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow::anyhow!("Pad controller input not found: {device_filter}"))?;
        let in_name = midi_in.port_name(&in_port).unwrap_or_else(|_| "Unknown".into());

        let input = midi_in
            .connect(
                &in_port,
                "padcafe-pads",
                move |_timestamp_us, bytes, _| {
                    if let Some(event) = decode(bytes) {
                        if sender.try_send(event).is_err() {
                            log::warn!("Pad channel full, dropping event");
                        }
                    }
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("Failed to open pad input {in_name}: {e}"))?;
        log::info!("Opened pad input: {in_name}");

        let midi_out = MidiOutput::new("padcafe")?;
        let out_port = midi_out
            .ports()
            .into_iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|n| n.contains(device_filter))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow::anyhow!("Pad controller output not found: {device_filter}"))?;
        let out_name = midi_out.port_name(&out_port).unwrap_or_else(|_| "Unknown".into());

        let output = midi_out
            .connect(&out_port, "padcafe-leds")
            .map_err(|e| anyhow::anyhow!("Failed to open pad output {out_name}: {e}"))?;
        log::info!("Opened pad LEDs: {out_name}");

        let mut grid = PadGrid {
            _input: input,
            output,
            last_frame: [[0; GRID_COLS]; GRID_ROWS],
        };
        grid.blank();
        Ok(grid)
    }

    /// Push the current frame to the pad LEDs, sending only cells that
    /// changed since the last flush.
    pub fn flush(&mut self, frame: &FrameBuffer) {
        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLS {
                let code = color_code(frame.color_at(row, col));
                if self.last_frame[row][col] != code {
                    self.last_frame[row][col] = code;
                    let msg = [0x90, cell_to_note(row, col), code];
                    if let Err(e) = self.output.send(&msg) {
                        log::warn!("Pad LED send failed: {e}");
                    }
                }
            }
        }
    }

    fn blank(&mut self) {
        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLS {
                let _ = self.output.send(&[0x90, cell_to_note(row, col), 0]);
            }
        }
    }
}

impl Drop for PadGrid {
    fn drop(&mut self) {
        self.blank();
    }
}

fn decode(bytes: &[u8]) -> Option<CellEvent> {
    let (&status, rest) = bytes.split_first()?;
    let (&note, rest) = rest.split_first()?;
    let value = *rest.first()? as f32 / 127.0;
    let (row, col) = note_to_cell(note)?;

    match status & 0xF0 {
        // Running note-on with velocity 0 is a release.
        0x90 => Some(CellEvent::Edge { row, col, value }),
        0x80 => Some(CellEvent::Edge {
            row,
            col,
            value: 0.0,
        }),
        // Polyphonic aftertouch: pressure on a held pad.
        0xA0 => Some(CellEvent::Value { row, col, value }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_cell_mapping_round_trips() {
        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLS {
                assert_eq!(note_to_cell(cell_to_note(row, col)), Some((row, col)));
            }
        }
    }

    #[test]
    fn corner_notes() {
        // Bottom-left pad is note 11 == grid row 5, col 0.
        assert_eq!(note_to_cell(11), Some((5, 0)));
        // Top row of the 6-row grid starts at note 61.
        assert_eq!(note_to_cell(61), Some((0, 0)));
        assert_eq!(note_to_cell(68), Some((0, 7)));
    }

    #[test]
    fn out_of_grid_notes_rejected() {
        // Column 8/9 are scene buttons, rows above the grid are unused.
        assert_eq!(note_to_cell(19), None);
        assert_eq!(note_to_cell(71), None);
        assert_eq!(note_to_cell(5), None);
    }

    #[test]
    fn decode_edges_and_pressure() {
        assert!(matches!(
            decode(&[0x90, 11, 100]),
            Some(CellEvent::Edge { row: 5, col: 0, value }) if value > 0.7
        ));
        assert!(matches!(
            decode(&[0x90, 11, 0]),
            Some(CellEvent::Edge { value, .. }) if value == 0.0
        ));
        assert!(matches!(
            decode(&[0x80, 11, 64]),
            Some(CellEvent::Edge { value, .. }) if value == 0.0
        ));
        assert!(matches!(
            decode(&[0xA0, 24, 64]),
            Some(CellEvent::Value { row: 4, col: 3, .. })
        ));
        assert_eq!(decode(&[0xB0, 11, 1]).map(|_| ()), None);
    }
}
