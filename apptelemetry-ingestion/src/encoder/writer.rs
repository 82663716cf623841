use std::io::{self, Write};
use std::time::Duration;

// 2^53, the largest magnitude below which every integer is exact in an f64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Streams compact JSON to an [`io::Write`].
///
/// The writer only tracks whether a separator is due; nesting is the
/// caller's responsibility.
pub(crate) struct JsonWriter<'a, W> {
    out: &'a mut W,
    first: bool,
}

impl<'a, W: Write> JsonWriter<'a, W> {
    pub(crate) fn new(out: &'a mut W) -> Self {
        JsonWriter { out, first: true }
    }

    fn separator(&mut self) -> io::Result<()> {
        if !self.first {
            self.out.write_all(b",")?;
        }
        self.first = false;
        Ok(())
    }

    pub(crate) fn begin_object(&mut self) -> io::Result<()> {
        self.separator()?;
        self.out.write_all(b"{")?;
        self.first = true;
        Ok(())
    }

    pub(crate) fn end_object(&mut self) -> io::Result<()> {
        self.out.write_all(b"}")?;
        self.first = false;
        Ok(())
    }

    pub(crate) fn begin_array(&mut self) -> io::Result<()> {
        self.separator()?;
        self.out.write_all(b"[")?;
        self.first = true;
        Ok(())
    }

    pub(crate) fn end_array(&mut self) -> io::Result<()> {
        self.out.write_all(b"]")?;
        self.first = false;
        Ok(())
    }

    /// Writes `"name":`. The next value follows without a separator.
    pub(crate) fn key(&mut self, name: &str) -> io::Result<()> {
        self.separator()?;
        self.text(name)?;
        self.out.write_all(b":")?;
        self.first = true;
        Ok(())
    }

    pub(crate) fn string(&mut self, value: &str) -> io::Result<()> {
        self.separator()?;
        self.text(value)
    }

    pub(crate) fn bool(&mut self, value: bool) -> io::Result<()> {
        self.separator()?;
        let literal: &[u8] = if value { b"true" } else { b"false" };
        self.out.write_all(literal)
    }

    pub(crate) fn int(&mut self, value: i64) -> io::Result<()> {
        self.separator()?;
        self.number(value)
    }

    /// Whole values are written without a fraction. Non-finite values have
    /// no JSON form and are written as `0`.
    pub(crate) fn float(&mut self, value: f64) -> io::Result<()> {
        self.separator()?;
        if !value.is_finite() {
            self.out.write_all(b"0")
        } else if value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER {
            self.number(value as i64)
        } else {
            serde_json::to_writer(&mut *self.out, &value).map_err(io::Error::from)
        }
    }

    /// Writes a duration as `"[d.]hh:mm:ss[.fffffff]"`.
    pub(crate) fn duration(&mut self, value: Duration) -> io::Result<()> {
        self.separator()?;
        let secs = value.as_secs();
        let days = secs / 86_400;
        let ticks = value.subsec_nanos() / 100;
        self.out.write_all(b"\"")?;
        if days > 0 {
            write!(self.out, "{days}.")?;
        }
        write!(
            self.out,
            "{:02}:{:02}:{:02}",
            (secs / 3600) % 24,
            (secs / 60) % 60,
            secs % 60
        )?;
        if ticks > 0 {
            write!(self.out, ".{ticks:07}")?;
        }
        self.out.write_all(b"\"")
    }

    pub(crate) fn field_str(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.key(name)?;
        self.string(value)
    }

    /// Writes the field only when `value` is set.
    pub(crate) fn field_opt_str(&mut self, name: &str, value: Option<&str>) -> io::Result<()> {
        match value {
            Some(value) => self.field_str(name, value),
            None => Ok(()),
        }
    }

    pub(crate) fn field_bool(&mut self, name: &str, value: bool) -> io::Result<()> {
        self.key(name)?;
        self.bool(value)
    }

    pub(crate) fn field_int(&mut self, name: &str, value: i64) -> io::Result<()> {
        self.key(name)?;
        self.int(value)
    }

    pub(crate) fn field_float(&mut self, name: &str, value: f64) -> io::Result<()> {
        self.key(name)?;
        self.float(value)
    }

    pub(crate) fn field_duration(&mut self, name: &str, value: Duration) -> io::Result<()> {
        self.key(name)?;
        self.duration(value)
    }

    fn text(&mut self, value: &str) -> io::Result<()> {
        serde_json::to_writer(&mut *self.out, value).map_err(io::Error::from)
    }

    fn number(&mut self, value: i64) -> io::Result<()> {
        serde_json::to_writer(&mut *self.out, &value).map_err(io::Error::from)
    }
}
