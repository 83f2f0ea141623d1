//! Amiga floppy drive mechanism.
//!
//! Models the parts of a drive that a head-positioning routine can see:
//! select and motor latch, step pulses with direction, and the TRACK0
//! sensor. Control signals come from CIA-B port B; status feeds back to
//! CIA-A port A. A drive that is not connected never answers.

/// Highest cylinder the head can reach.
pub const LAST_CYLINDER: u32 = 79;

/// Drive status bits for CIA-A PRA (active-low: 0 = asserted).
pub struct DriveStatus {
    /// PA4: /DSKTRACK0: low when head is at cylinder 0.
    pub track0: bool,
    /// PA5: /DSKRDY: low when the motor is on.
    pub ready: bool,
}

/// Control lines from CIA-B PRB, decoded to "asserted" booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveControl {
    pub step: bool,
    pub dir_inward: bool,
    pub side_upper: bool,
    pub motor: bool,
}

impl DriveControl {
    /// Decode the shared control bits of a PRB value (all active-low).
    #[must_use]
    pub fn from_prb(prb: u8) -> Self {
        Self {
            step: prb & 0x01 == 0,
            dir_inward: prb & 0x02 == 0,
            side_upper: prb & 0x04 == 0,
            motor: prb & 0x80 == 0,
        }
    }
}

pub struct AmigaFloppyDrive {
    connected: bool,
    cylinder: u32,
    head: u32,
    motor_on: bool,
    selected: bool,
    prev_step: bool,
    steps: u32,
}

impl AmigaFloppyDrive {
    /// A connected drive with its head parked at `cylinder`.
    pub fn new(cylinder: u32) -> Self {
        Self {
            connected: true,
            cylinder: cylinder.min(LAST_CYLINDER),
            head: 0,
            motor_on: false,
            selected: false,
            prev_step: false,
            steps: 0,
        }
    }

    /// An empty drive bay.
    pub fn absent() -> Self {
        Self {
            connected: false,
            ..Self::new(0)
        }
    }

    /// Update control signals from CIA-B PRB. `sel` is true while this
    /// drive's select line is asserted.
    pub fn update_control(&mut self, control: DriveControl, sel: bool) {
        if !self.connected {
            return;
        }
        // Select falling edge latches the motor line
        if sel && !self.selected {
            self.motor_on = control.motor;
        }
        self.selected = sel;
        if !sel {
            self.prev_step = control.step;
            return;
        }

        self.head = u32::from(control.side_upper);

        let step_edge = control.step && !self.prev_step;
        self.prev_step = control.step;

        if step_edge {
            self.steps += 1;
            if control.dir_inward {
                if self.cylinder < LAST_CYLINDER {
                    self.cylinder += 1;
                }
            } else if self.cylinder > 0 {
                self.cylinder -= 1;
            }
        }
    }

    /// Status as driven onto CIA-A PRA while selected.
    /// Active-low booleans (true = signal asserted = pin low).
    pub fn status(&self) -> DriveStatus {
        DriveStatus {
            track0: self.connected && self.selected && self.cylinder == 0,
            ready: self.connected && self.selected && self.motor_on,
        }
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn cylinder(&self) -> u32 {
        self.cylinder
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    /// Step pulses seen since construction.
    pub fn steps(&self) -> u32 {
        self.steps
    }
}

impl Default for AmigaFloppyDrive {
    fn default() -> Self {
        Self::new(0)
    }
}
