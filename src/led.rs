//! RGB indicator LED: solid colors and timed blink sequences.
//!
//! [`LedIndicator`] only tracks what the LED should show; [`RgbLed`] pushes that onto three
//! output pins. Call [`LedIndicator::poll`] once per tick.

use embedded_hal_1::digital::OutputPin;

/// On/off state of each channel of a common-cathode RGB LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
}

impl Color {
    pub const fn new(red: bool, green: bool, blue: bool) -> Self {
        Color { red, green, blue }
    }
}

pub const RED: Color = Color::new(true, false, false);
pub const GREEN: Color = Color::new(false, true, false);
pub const BLUE: Color = Color::new(false, false, true);
pub const CYAN: Color = Color::new(false, true, true);
pub const MAGENTA: Color = Color::new(true, false, true);
pub const YELLOW: Color = Color::new(true, true, false);
pub const WHITE: Color = Color::new(true, true, true);

/// How many times to blink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycles {
    Count(u16),
    /// Blink until another `on`/`off`/`blink` call.
    Forever,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Blink {
    color: Color,
    cycles: Cycles,
    half_period_ms: u32,
    completed: u16,
    lit: bool,
    last_toggle_ms: u64,
    /// Color to go back to when finished; `None` leaves the LED off.
    resume: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Off,
    Solid(Color),
    Blinking(Blink),
}

#[derive(Debug, Clone)]
pub struct LedIndicator {
    mode: Mode,
}

impl Default for LedIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl LedIndicator {
    pub fn new() -> Self {
        LedIndicator { mode: Mode::Off }
    }

    /// Solid color. Cancels any blink.
    pub fn on(&mut self, color: Color) {
        self.mode = Mode::Solid(color);
    }

    /// Dark. Cancels any blink.
    pub fn off(&mut self) {
        self.mode = Mode::Off;
    }

    /// Start blinking `color`, replacing any blink in progress.
    ///
    /// With `return_to_last_state` the LED goes back to the solid color it showed when this was
    /// called. Interrupting another blink does not stack: the LED then ends dark.
    pub fn blink(
        &mut self,
        color: Color,
        cycles: Cycles,
        period_ms: u32,
        return_to_last_state: bool,
        now_ms: u64,
    ) {
        let resume = match (return_to_last_state, self.mode) {
            (true, Mode::Solid(c)) => Some(c),
            _ => None,
        };
        if cycles == Cycles::Count(0) {
            self.finish(resume);
            return;
        }
        self.mode = Mode::Blinking(Blink {
            color,
            cycles,
            half_period_ms: period_ms / 2,
            completed: 0,
            lit: true,
            last_toggle_ms: now_ms,
            resume,
        });
    }

    pub fn is_blinking(&self) -> bool {
        matches!(self.mode, Mode::Blinking(_))
    }

    /// Advance a running blink.
    pub fn poll(&mut self, now_ms: u64) {
        let Mode::Blinking(blink) = &mut self.mode else {
            return;
        };
        if now_ms.wrapping_sub(blink.last_toggle_ms) <= blink.half_period_ms as u64 {
            return;
        }
        if blink.lit {
            blink.lit = false;
            blink.last_toggle_ms = now_ms;
            return;
        }
        let done = match blink.cycles {
            Cycles::Count(n) => blink.completed + 1 >= n,
            Cycles::Forever => false,
        };
        if done {
            let resume = blink.resume;
            self.finish(resume);
        } else {
            blink.lit = true;
            blink.completed = blink.completed.saturating_add(1);
            blink.last_toggle_ms = now_ms;
        }
    }

    fn finish(&mut self, resume: Option<Color>) {
        self.mode = match resume {
            Some(c) => Mode::Solid(c),
            None => Mode::Off,
        };
    }

    /// What the LED shows right now; `None` is dark.
    pub fn output(&self) -> Option<Color> {
        match self.mode {
            Mode::Off => None,
            Mode::Solid(c) => Some(c),
            Mode::Blinking(b) if b.lit => Some(b.color),
            Mode::Blinking(_) => None,
        }
    }
}

/// Common-cathode RGB LED on three push-pull pins.
pub struct RgbLed<P: OutputPin> {
    red: P,
    green: P,
    blue: P,
    shown: Option<Option<Color>>,
}

impl<P: OutputPin> RgbLed<P> {
    pub fn new(red: P, green: P, blue: P) -> Self {
        RgbLed {
            red,
            green,
            blue,
            shown: None,
        }
    }

    /// Drive the pins to `color`. Pins are only touched when the color changed.
    pub fn show(&mut self, color: Option<Color>) -> Result<(), P::Error> {
        if self.shown == Some(color) {
            return Ok(());
        }
        let c = color.unwrap_or_default();
        self.red.set_state(c.red.into())?;
        self.green.set_state(c.green.into())?;
        self.blue.set_state(c.blue.into())?;
        self.shown = Some(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Poll every millisecond and count dark→lit transitions of the blink until `until`.
    fn run(led: &mut LedIndicator, from: u64, until: u64) -> usize {
        let mut flashes = 0;
        let mut was_lit = led.output().is_some();
        for t in from..until {
            led.poll(t);
            let lit = led.output().is_some();
            if lit && !was_lit && led.is_blinking() {
                flashes += 1;
            }
            was_lit = lit;
        }
        flashes
    }

    #[test]
    fn blink_counts_cycles_then_resumes() {
        let mut led = LedIndicator::new();
        led.on(GREEN);
        led.blink(RED, Cycles::Count(3), 100, true, 0);
        assert_eq!(led.output(), Some(RED));
        // first flash is the initial lit phase, two more follow
        assert_eq!(run(&mut led, 1, 2000), 2);
        assert!(!led.is_blinking());
        assert_eq!(led.output(), Some(GREEN));
    }

    #[test]
    fn blink_without_return_ends_dark() {
        let mut led = LedIndicator::new();
        led.on(GREEN);
        led.blink(RED, Cycles::Count(2), 100, false, 0);
        run(&mut led, 1, 2000);
        assert_eq!(led.output(), None);
    }

    #[test]
    fn nested_blink_does_not_stack() {
        let mut led = LedIndicator::new();
        led.on(BLUE);
        led.blink(RED, Cycles::Count(5), 100, true, 0);
        led.blink(WHITE, Cycles::Count(1), 100, true, 10);
        run(&mut led, 11, 2000);
        assert_eq!(led.output(), None);
    }

    #[test]
    fn forever_blink_until_cancelled() {
        let mut led = LedIndicator::new();
        led.blink(MAGENTA, Cycles::Forever, 100, true, 0);
        assert!(run(&mut led, 1, 10_000) > 50);
        assert!(led.is_blinking());
        led.on(YELLOW);
        assert!(!led.is_blinking());
        assert_eq!(led.output(), Some(YELLOW));
    }

    #[test]
    fn zero_cycles_is_immediate() {
        let mut led = LedIndicator::new();
        led.on(CYAN);
        led.blink(RED, Cycles::Count(0), 100, true, 0);
        assert_eq!(led.output(), Some(CYAN));
    }

    #[derive(Default)]
    struct Pin(bool);

    impl embedded_hal_1::digital::ErrorType for Pin {
        type Error = core::convert::Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0 = false;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0 = true;
            Ok(())
        }
    }

    #[test]
    fn rgb_pins_follow_color() {
        let mut rgb = RgbLed::new(Pin::default(), Pin::default(), Pin::default());
        rgb.show(Some(YELLOW)).unwrap();
        assert!(rgb.red.0 && rgb.green.0 && !rgb.blue.0);
        rgb.show(None).unwrap();
        assert!(!rgb.red.0 && !rgb.green.0 && !rgb.blue.0);
    }
}
