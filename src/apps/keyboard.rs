//! Keyboard scan task
//!
//! Reads the whole switch matrix once per period, turns edges into HID
//! press/release reports, and sleeps for whatever is left of the period.
//! A `Fn` key selects the second layer of `Dual` entries, which may be a
//! key, a pointer action or a media key. HID failures are handled here
//! (release everything, reconnect, re-press whatever is still held) and
//! never reach the scheduler.
//!
//! Author: Moroya Sakamoto

use heapless::Vec;
use log::warn;

use crate::condition::{Condition, Step};
use crate::message::Message;
use crate::task::{Context, Routine, TaskFault};

use super::{ConsumerCode, HidSink, KeyMatrix, Keycode, PointerAction};

/// Keys reported at once (boot-protocol 6KRO)
pub const MAX_HELD: usize = 6;

/// One-shot events (pointer, media) handled per scan
pub const MAX_EVENTS: usize = 6;

/// Second-layer entry of a `Dual` key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnAction {
    Key(Keycode),
    /// Fires once per press
    Pointer(PointerAction),
    /// Fires once per press
    Media(ConsumerCode),
}

/// One matrix position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Unpopulated
    None,
    /// Layer modifier
    Fn,
    Key(Keycode),
    /// `base` normally, `fn_layer` while Fn is held
    Dual { base: Keycode, fn_layer: FnAction },
    /// Fires once per press
    Pointer(PointerAction),
}

/// `ROWS x COLS` key layout
pub type Keymap<const ROWS: usize, const COLS: usize> = [[KeyAction; COLS]; ROWS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardConfig {
    /// Scan period
    pub interval_ms: u32,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self { interval_ms: 25 }
    }
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Pointer(PointerAction),
    Media(ConsumerCode),
}

/// What a fresh press turns into
enum Press {
    Nothing,
    Key(Keycode),
    Event(Event),
}

pub struct KeyboardTask<'k, M, H, const ROWS: usize, const COLS: usize>
where
    M: KeyMatrix,
    H: HidSink,
{
    matrix: M,
    hid: H,
    keymap: &'k Keymap<ROWS, COLS>,
    config: KeyboardConfig,
    /// Positions whose press has been handled
    down: [[bool; COLS]; ROWS],
    /// Code sent for each held position, so release matches press
    sent: [[Option<Keycode>; COLS]; ROWS],
    held: Vec<Keycode, MAX_HELD>,
    hid_errors: u32,
}

impl<'k, M, H, const ROWS: usize, const COLS: usize> KeyboardTask<'k, M, H, ROWS, COLS>
where
    M: KeyMatrix,
    H: HidSink,
{
    pub fn new(matrix: M, hid: H, keymap: &'k Keymap<ROWS, COLS>, config: KeyboardConfig) -> Self {
        Self {
            matrix,
            hid,
            keymap,
            config,
            down: [[false; COLS]; ROWS],
            sent: [[None; COLS]; ROWS],
            held: Vec::new(),
            hid_errors: 0,
        }
    }

    /// Keys currently reported as held
    pub fn held(&self) -> &[Keycode] {
        &self.held
    }

    /// HID failures recovered from
    pub fn hid_errors(&self) -> u32 {
        self.hid_errors
    }

    pub fn hid(&self) -> &H {
        &self.hid
    }

    pub fn matrix_mut(&mut self) -> &mut M {
        &mut self.matrix
    }

    fn resolve(action: KeyAction, fn_held: bool) -> Press {
        match action {
            KeyAction::None | KeyAction::Fn => Press::Nothing,
            KeyAction::Key(code) => Press::Key(code),
            KeyAction::Dual { base, .. } if !fn_held => Press::Key(base),
            KeyAction::Dual { fn_layer, .. } => match fn_layer {
                FnAction::Key(code) => Press::Key(code),
                FnAction::Pointer(action) => Press::Event(Event::Pointer(action)),
                FnAction::Media(code) => Press::Event(Event::Media(code)),
            },
            KeyAction::Pointer(action) => Press::Event(Event::Pointer(action)),
        }
    }

    fn scan(&mut self) -> Result<(), H::Error> {
        let mut now = [[false; COLS]; ROWS];
        let mut fn_held = false;
        for (row, states) in now.iter_mut().enumerate() {
            for (col, state) in states.iter_mut().enumerate() {
                *state = self.matrix.read(row, col);
                if *state && self.keymap[row][col] == KeyAction::Fn {
                    fn_held = true;
                }
            }
        }

        let mut pressed = false;
        let mut released: Vec<Keycode, MAX_HELD> = Vec::new();
        let mut events: Vec<Event, MAX_EVENTS> = Vec::new();

        for row in 0..ROWS {
            for col in 0..COLS {
                let is_down = now[row][col];
                if is_down == self.down[row][col] {
                    continue;
                }

                if !is_down {
                    self.down[row][col] = false;
                    if let Some(code) = self.sent[row][col].take() {
                        self.held.retain(|k| *k != code);
                        let _ = released.push(code);
                    }
                    continue;
                }

                // a press that cannot be taken now stays unhandled and is
                // retried on the next scan
                match Self::resolve(self.keymap[row][col], fn_held) {
                    Press::Nothing => {}
                    Press::Key(code) => {
                        if self.held.push(code).is_err() {
                            warn!("rollover limit reached, deferring key {:?}", code);
                            continue;
                        }
                        self.sent[row][col] = Some(code);
                        pressed = true;
                    }
                    Press::Event(event) => {
                        if events.push(event).is_err() {
                            warn!("too many pointer/media events, deferring {:?}", event);
                            continue;
                        }
                    }
                }
                self.down[row][col] = true;
            }
        }

        if pressed {
            self.hid.press(&self.held)?;
        }
        if !released.is_empty() {
            self.hid.release(&released)?;
        }
        for event in events {
            match event {
                Event::Pointer(action) => self.hid.pointer(action)?,
                Event::Media(code) => self.hid.consumer(code)?,
            }
        }
        Ok(())
    }

    /// Drop all reported state so keys still held are pressed afresh on
    /// the next scan
    fn recover(&mut self) {
        self.hid_errors = self.hid_errors.saturating_add(1);
        self.held.clear();
        self.sent = [[None; COLS]; ROWS];
        self.down = [[false; COLS]; ROWS];
        if let Err(e) = self.hid.release_all() {
            warn!("hid release_all failed: {:?}", e);
        }
        if let Err(e) = self.hid.reconnect() {
            warn!("hid reconnect failed: {:?}", e);
        }
    }
}

impl<'k, M, H, const ROWS: usize, const COLS: usize> Routine for KeyboardTask<'k, M, H, ROWS, COLS>
where
    M: KeyMatrix,
    H: HidSink,
{
    fn resume(&mut self, ctx: &Context<'_>, _: Option<Message>) -> Result<Step, TaskFault> {
        let start = ctx.now();
        if let Err(e) = self.scan() {
            warn!("hid error: {:?}", e);
            self.recover();
        }
        let remaining = self.config.interval_ms as i64 - ctx.now().since(start) as i64;
        if remaining > 0 {
            Ok(Condition::sleep(remaining as u32).into())
        } else {
            Ok(Condition::yield_now().into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::MouseButton;
    use crate::message::TaskId;
    use crate::stats::Health;
    use crate::tick::{SoftClock, Tick};

    const K: Keymap<2, 3> = [
        [
            KeyAction::Key(Keycode::Q),
            KeyAction::Key(Keycode::W),
            KeyAction::Dual {
                base: Keycode::ONE,
                fn_layer: FnAction::Key(Keycode::F1),
            },
        ],
        [
            KeyAction::Fn,
            KeyAction::Pointer(PointerAction::Click(MouseButton::Left)),
            KeyAction::None,
        ],
    ];

    /// Fn layer carrying pointer and volume actions
    const NAV: Keymap<2, 3> = [
        [
            KeyAction::Dual {
                base: Keycode::O,
                fn_layer: FnAction::Pointer(PointerAction::Move { x: 0, y: -15 }),
            },
            KeyAction::Dual {
                base: Keycode::UP_ARROW,
                fn_layer: FnAction::Media(ConsumerCode::VOLUME_INCREMENT),
            },
            KeyAction::Dual {
                base: Keycode::I,
                fn_layer: FnAction::Pointer(PointerAction::Click(MouseButton::Left)),
            },
        ],
        [KeyAction::Fn, KeyAction::None, KeyAction::None],
    ];

    const WIDE: Keymap<2, 4> = [
        [
            KeyAction::Key(Keycode::A),
            KeyAction::Key(Keycode::B),
            KeyAction::Key(Keycode::C),
            KeyAction::Key(Keycode::D),
        ],
        [
            KeyAction::Key(Keycode::E),
            KeyAction::Key(Keycode::I),
            KeyAction::Key(Keycode::J),
            KeyAction::Key(Keycode::K),
        ],
    ];

    struct Switches<const R: usize, const C: usize>([[bool; C]; R]);

    impl<const R: usize, const C: usize> Switches<R, C> {
        fn open() -> Self {
            Self([[false; C]; R])
        }
    }

    impl<const R: usize, const C: usize> KeyMatrix for Switches<R, C> {
        fn read(&mut self, row: usize, col: usize) -> bool {
            self.0[row][col]
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Report {
        Press(Vec<Keycode, MAX_HELD>),
        Release(Vec<Keycode, MAX_HELD>),
        ReleaseAll,
        Pointer(PointerAction),
        Media(ConsumerCode),
        Reconnect,
    }

    #[derive(Default)]
    struct Recorder {
        reports: Vec<Report, 16>,
        fail_next: bool,
    }

    impl Recorder {
        fn log(&mut self, r: Report) -> Result<(), &'static str> {
            if self.fail_next {
                self.fail_next = false;
                return Err("usb stalled");
            }
            let _ = self.reports.push(r);
            Ok(())
        }
    }

    impl HidSink for Recorder {
        type Error = &'static str;

        fn press(&mut self, keys: &[Keycode]) -> Result<(), Self::Error> {
            self.log(Report::Press(Vec::from_slice(keys).unwrap()))
        }

        fn release(&mut self, keys: &[Keycode]) -> Result<(), Self::Error> {
            self.log(Report::Release(Vec::from_slice(keys).unwrap()))
        }

        fn release_all(&mut self) -> Result<(), Self::Error> {
            self.log(Report::ReleaseAll)
        }

        fn pointer(&mut self, action: PointerAction) -> Result<(), Self::Error> {
            self.log(Report::Pointer(action))
        }

        fn consumer(&mut self, code: ConsumerCode) -> Result<(), Self::Error> {
            self.log(Report::Media(code))
        }

        fn reconnect(&mut self) -> Result<(), Self::Error> {
            self.log(Report::Reconnect)
        }
    }

    type Board<'k, const R: usize, const C: usize> = KeyboardTask<'k, Switches<R, C>, Recorder, R, C>;

    fn board<const R: usize, const C: usize>(keymap: &Keymap<R, C>) -> Board<'_, R, C> {
        KeyboardTask::new(Switches::open(), Recorder::default(), keymap, KeyboardConfig::default())
    }

    fn keys(k: &[Keycode]) -> Vec<Keycode, MAX_HELD> {
        Vec::from_slice(k).unwrap()
    }

    fn resume<const R: usize, const C: usize>(task: &mut Board<'_, R, C>, clock: &SoftClock) -> Step {
        let ctx = Context {
            id: TaskId::new(0),
            name: "keyboard",
            clock,
            health: Health {
                cpu_id: 0,
                idle_percent: 0.0,
                free_memory: 0,
                total_memory: 0,
            },
        };
        task.resume(&ctx, None).unwrap()
    }

    #[test]
    fn test_press_and_release() {
        let clock = SoftClock::new();
        let mut kb = board(&K);
        kb.matrix_mut().0[0][0] = true;
        resume(&mut kb, &clock);
        assert_eq!(kb.held(), &[Keycode::Q]);
        kb.matrix_mut().0[0][1] = true;
        resume(&mut kb, &clock);
        kb.matrix_mut().0[0][0] = false;
        resume(&mut kb, &clock);
        assert_eq!(kb.held(), &[Keycode::W]);
        assert_eq!(
            &kb.hid().reports[..],
            &[
                Report::Press(keys(&[Keycode::Q])),
                Report::Press(keys(&[Keycode::Q, Keycode::W])),
                Report::Release(keys(&[Keycode::Q])),
            ]
        );
    }

    #[test]
    fn test_fn_layer() {
        let clock = SoftClock::new();
        let mut kb = board(&K);
        kb.matrix_mut().0[1][0] = true;
        kb.matrix_mut().0[0][2] = true;
        resume(&mut kb, &clock);
        assert_eq!(kb.held(), &[Keycode::F1]);
        // releasing Fn first must still release F1, not ONE
        kb.matrix_mut().0[1][0] = false;
        resume(&mut kb, &clock);
        kb.matrix_mut().0[0][2] = false;
        resume(&mut kb, &clock);
        assert!(kb.held().is_empty());
        assert_eq!(
            &kb.hid().reports[..],
            &[Report::Press(keys(&[Keycode::F1])), Report::Release(keys(&[Keycode::F1]))]
        );
    }

    #[test]
    fn test_fn_layer_pointer_and_media() {
        let clock = SoftClock::new();
        let mut kb = board(&NAV);
        kb.matrix_mut().0[1][0] = true;
        kb.matrix_mut().0[0][0] = true;
        kb.matrix_mut().0[0][1] = true;
        resume(&mut kb, &clock);
        // still held: nothing repeats
        resume(&mut kb, &clock);
        assert!(kb.held().is_empty());
        kb.matrix_mut().0[0][0] = false;
        kb.matrix_mut().0[0][1] = false;
        resume(&mut kb, &clock);
        assert_eq!(
            &kb.hid().reports[..],
            &[
                Report::Pointer(PointerAction::Move { x: 0, y: -15 }),
                Report::Media(ConsumerCode::VOLUME_INCREMENT),
            ]
        );
    }

    #[test]
    fn test_dual_base_without_fn() {
        let clock = SoftClock::new();
        let mut kb = board(&NAV);
        kb.matrix_mut().0[0][2] = true;
        resume(&mut kb, &clock);
        assert_eq!(kb.held(), &[Keycode::I]);
        assert_eq!(&kb.hid().reports[..], &[Report::Press(keys(&[Keycode::I]))]);
    }

    #[test]
    fn test_pointer_fires_once_per_press() {
        let clock = SoftClock::new();
        let mut kb = board(&K);
        kb.matrix_mut().0[1][1] = true;
        resume(&mut kb, &clock);
        resume(&mut kb, &clock);
        assert_eq!(
            &kb.hid().reports[..],
            &[Report::Pointer(PointerAction::Click(MouseButton::Left))]
        );
    }

    #[test]
    fn test_hid_failure_contained() {
        let clock = SoftClock::new();
        let mut kb = board(&K);
        kb.hid.fail_next = true;
        kb.matrix_mut().0[0][0] = true;
        let step = resume(&mut kb, &clock);
        assert!(matches!(step, Step::Yield(_)));
        assert_eq!(kb.hid_errors(), 1);
        assert!(kb.held().is_empty());
        assert_eq!(&kb.hid().reports[..], &[Report::ReleaseAll, Report::Reconnect]);
    }

    #[test]
    fn test_held_key_pressed_again_after_hid_failure() {
        let clock = SoftClock::new();
        let mut kb = board(&K);
        kb.hid.fail_next = true;
        kb.matrix_mut().0[0][0] = true;
        for _ in 0..3 {
            resume(&mut kb, &clock);
        }
        assert_eq!(kb.held(), &[Keycode::Q]);
        assert_eq!(
            &kb.hid().reports[..],
            &[Report::ReleaseAll, Report::Reconnect, Report::Press(keys(&[Keycode::Q]))]
        );
    }

    #[test]
    fn test_rollover_key_reported_when_slot_frees() {
        let clock = SoftClock::new();
        let mut kb = board(&WIDE);
        for col in 0..4 {
            kb.matrix_mut().0[0][col] = true;
        }
        for col in 0..3 {
            kb.matrix_mut().0[1][col] = true;
        }
        resume(&mut kb, &clock);
        assert_eq!(kb.held().len(), MAX_HELD);
        assert!(!kb.held().contains(&Keycode::J));

        kb.matrix_mut().0[0][0] = false;
        resume(&mut kb, &clock);
        assert!(kb.held().contains(&Keycode::J));
        assert!(!kb.held().contains(&Keycode::A));
        assert_eq!(
            kb.hid().reports.last(),
            Some(&Report::Release(keys(&[Keycode::A])))
        );
    }

    #[test]
    fn test_pointer_burst_deferred_not_lost() {
        const WHEEL: KeyAction = KeyAction::Pointer(PointerAction::Wheel(3));
        const SCROLL: Keymap<1, 7> = [[WHEEL; 7]];
        let clock = SoftClock::new();
        let mut kb = board(&SCROLL);
        kb.matrix_mut().0[0] = [true; 7];
        resume(&mut kb, &clock);
        assert_eq!(kb.hid().reports.len(), MAX_EVENTS);
        resume(&mut kb, &clock);
        assert_eq!(kb.hid().reports.len(), MAX_EVENTS + 1);
        resume(&mut kb, &clock);
        assert_eq!(kb.hid().reports.len(), MAX_EVENTS + 1);
    }

    #[test]
    fn test_sleep_compensates_scan_time() {
        let clock = SoftClock::starting_at(Tick::from_ms(1000));
        let mut kb = KeyboardTask::new(Switches::<2, 3>::open(), Recorder::default(), &K, KeyboardConfig { interval_ms: 50 });
        match resume(&mut kb, &clock) {
            Step::Yield(c) => assert_eq!(c.sleep_ms(), 50),
            Step::Complete => panic!("keyboard task never completes"),
        }
    }
}
