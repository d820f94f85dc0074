//! External command-line codec.
//!
//! Each call gets its own temporary directory, so concurrent sweep steps never
//! share intermediate files. Planes are exchanged as 8-bit grayscale PNG after
//! [`SampleRange`] normalization.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use image::GrayImage;
use imgref::{ImgRef, ImgVec};
use tempfile::TempDir;
use tracing::{debug, trace};

use crate::codec::{Bitstream, CodecAdapter, SampleRange};
use crate::error::{Error, Result};
use crate::plane::Plane;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Program plus arguments with `{q}`, `{input}` and `{output}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Split a whitespace-separated command line.
    ///
    /// Placeholders are substituted per argument, so substituted paths may
    /// contain spaces.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::invalid("command", "empty command template"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Template running `program` with the given argument templates.
    #[must_use]
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    fn render(&self, q: Option<u32>, input: &Path, output: &Path) -> Command {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let q = q.map(|q| q.to_string()).unwrap_or_default();

        let mut command = Command::new(&self.program);
        for arg in &self.args {
            command.arg(
                arg.replace("{q}", &q)
                    .replace("{input}", &input)
                    .replace("{output}", &output),
            );
        }
        command
    }
}

/// Codec backed by an encoder and a decoder executable.
#[derive(Debug, Clone)]
pub struct ExternalCommandCodec {
    id: String,
    encoder: CommandTemplate,
    decoder: CommandTemplate,
    extension: String,
    timeout: Option<Duration>,
}

impl ExternalCommandCodec {
    /// Codec from encoder/decoder command lines.
    ///
    /// ```
    /// use vst_eval::codec::ExternalCommandCodec;
    ///
    /// let codec = ExternalCommandCodec::new(
    ///     "my-codec",
    ///     "myenc --quality {q} {input} {output}",
    ///     "mydec {input} {output}",
    /// )
    /// .unwrap();
    /// ```
    pub fn new(id: impl Into<String>, encoder: &str, decoder: &str) -> Result<Self> {
        Ok(Self::from_templates(
            id,
            CommandTemplate::parse(encoder)?,
            CommandTemplate::parse(decoder)?,
        ))
    }

    /// Codec from prepared templates.
    #[must_use]
    pub fn from_templates(id: impl Into<String>, encoder: CommandTemplate, decoder: CommandTemplate) -> Self {
        Self {
            id: id.into(),
            encoder,
            decoder,
            extension: "bin".to_string(),
            timeout: None,
        }
    }

    /// BPG tools (`bpgenc`/`bpgdec`) installed in `dir`.
    #[must_use]
    pub fn bpg(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let tool = |name: &str| dir.join(name).to_string_lossy().into_owned();
        Self::from_templates(
            "bpg",
            CommandTemplate::new(tool("bpgenc"), &["-q", "{q}", "-b", "8", "-o", "{output}", "{input}"]),
            CommandTemplate::new(tool("bpgdec"), &["-o", "{output}", "{input}"]),
        )
        .with_extension("bpg")
    }

    /// Kill a codec process that runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// File extension of the encoded artifact.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn codec_error(&self, message: impl Into<String>) -> Error {
        Error::Codec {
            codec: self.id.clone(),
            message: message.into(),
        }
    }

    fn workdir(&self) -> Result<TempDir> {
        Ok(tempfile::Builder::new().prefix("vst-eval-").tempdir()?)
    }

    fn run(&self, stage: &str, mut command: Command, workdir: &Path) -> Result<()> {
        let stderr_path = workdir.join(format!("{stage}.stderr"));
        let stderr = File::create(&stderr_path)?;

        trace!(codec = %self.id, stage, ?command, "spawning codec");
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|e| self.codec_error(format!("failed to start {stage}: {e}")))?;

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => {
                let started = Instant::now();
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if started.elapsed() >= limit {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(Error::CodecTimeout {
                            codec: self.id.clone(),
                            timeout: limit,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };

        self.check_status(stage, status, &stderr_path)
    }

    fn check_status(&self, stage: &str, status: ExitStatus, stderr_path: &Path) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        let detail = fs::read_to_string(stderr_path).unwrap_or_default();
        Err(self.codec_error(format!("{stage} failed ({status}): {}", detail.trim())))
    }

    fn read_output(&self, stage: &str, path: &Path) -> Result<Vec<u8>> {
        match fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(self.codec_error(format!("{stage} produced no output file")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn encoded_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("encoded.{}", self.extension))
    }
}

impl CodecAdapter for ExternalCommandCodec {
    fn id(&self) -> &str {
        &self.id
    }

    fn compress(&self, image: ImgRef<'_, f64>, q: u32) -> Result<Bitstream> {
        let range = SampleRange::fit(image)?;
        let quantized = range.quantize(image);
        let (width, height) = (image.width(), image.height());

        let dir = self.workdir()?;
        let input = dir.path().join("input.png");
        let output = self.encoded_path(dir.path());

        let buf = quantized.into_buf();
        let png = GrayImage::from_raw(width as u32, height as u32, buf)
            .ok_or_else(|| self.codec_error("plane does not fit an 8-bit image"))?;
        png.save(&input)
            .map_err(|e| self.codec_error(format!("failed to write encoder input: {e}")))?;

        self.run("encoder", self.encoder.render(Some(q), &input, &output), dir.path())?;
        let bytes = self.read_output("encoder", &output)?;
        debug!(codec = %self.id, q, size = bytes.len(), "compressed");

        Ok(Bitstream {
            bytes,
            width,
            height,
            range: Some(range),
        })
    }

    fn decompress(&self, bitstream: &Bitstream) -> Result<Plane> {
        let dir = self.workdir()?;
        let input = self.encoded_path(dir.path());
        let output = dir.path().join("decoded.png");
        fs::write(&input, &bitstream.bytes)?;

        self.run("decoder", self.decoder.render(None, &input, &output), dir.path())?;
        if !output.exists() {
            return Err(self.codec_error("decoder produced no output file"));
        }

        let decoded = image::open(&output)
            .map_err(|e| self.codec_error(format!("unreadable decoder output: {e}")))?
            .to_luma8();

        let (width, height) = (bitstream.width, bitstream.height);
        if (decoded.width() as usize) < width || (decoded.height() as usize) < height {
            return Err(self.codec_error(format!(
                "decoded {}x{} is smaller than the encoded {width}x{height}",
                decoded.width(),
                decoded.height()
            )));
        }

        let decoded_width = decoded.width() as usize;
        let raw = decoded.into_raw();
        let pixels: Vec<u8> = raw
            .chunks_exact(decoded_width)
            .take(height)
            .flat_map(|row| row[..width].iter().copied())
            .collect();
        let samples = ImgVec::new(pixels, width, height);

        Ok(match bitstream.range {
            Some(range) => range.dequantize(samples.as_ref()),
            None => {
                let pixels = samples.pixels().map(f64::from).collect();
                ImgVec::new(pixels, width, height)
            }
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::plane::linear_ramp;

    fn copy_codec() -> ExternalCommandCodec {
        ExternalCommandCodec::new("copy", "cp {input} {output}", "cp {input} {output}").unwrap()
    }

    #[test]
    fn test_parse_template() {
        let template = CommandTemplate::parse("enc -q {q}  {input} {output}").unwrap();
        assert_eq!(template, CommandTemplate::new("enc", &["-q", "{q}", "{input}", "{output}"]));
        assert!(CommandTemplate::parse("   ").is_err());
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let template = CommandTemplate::parse("enc -q{q} {input} --out={output}").unwrap();
        let command = template.render(Some(31), Path::new("/tmp/a b.png"), Path::new("/tmp/o.bin"));
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["-q31", "/tmp/a b.png", "--out=/tmp/o.bin"]);
    }

    #[test]
    fn test_bpg_preset() {
        let codec = ExternalCommandCodec::bpg("/opt/bpg");
        assert_eq!(codec.id(), "bpg");
        assert_eq!(codec.encoder.program, "/opt/bpg/bpgenc");
        assert_eq!(codec.encoder.args, ["-q", "{q}", "-b", "8", "-o", "{output}", "{input}"]);
        assert_eq!(codec.decoder.program, "/opt/bpg/bpgdec");
        assert_eq!(codec.extension, "bpg");
    }

    #[test]
    fn test_lossless_copy_round_trip() {
        let codec = copy_codec();
        let img = linear_ramp(19, 7, 10.0, 200.0).unwrap();
        let bitstream = codec.compress(img.as_ref(), 25).unwrap();
        assert!(codec.size_bytes(&bitstream) > 0);
        assert_eq!((bitstream.width, bitstream.height), (19, 7));

        let decoded = codec.decompress(&bitstream).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (19, 7));
        let step = 190.0 / 255.0;
        for (a, b) in img.pixels().zip(decoded.pixels()) {
            assert!((a - b).abs() <= step + 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_failing_encoder_is_codec_error() {
        let codec = ExternalCommandCodec::new("broken", "false", "false").unwrap();
        let img = linear_ramp(8, 8, 1.0, 2.0).unwrap();
        assert!(matches!(
            codec.compress(img.as_ref(), 1),
            Err(Error::Codec { .. })
        ));
    }

    #[test]
    fn test_missing_output_is_codec_error() {
        let codec = ExternalCommandCodec::new("silent", "true", "true").unwrap();
        let img = linear_ramp(8, 8, 1.0, 2.0).unwrap();
        let err = codec.compress(img.as_ref(), 1).unwrap_err();
        assert!(err.to_string().contains("no output"), "{err}");
    }

    #[test]
    fn test_missing_program_is_codec_error() {
        let codec = ExternalCommandCodec::new("ghost", "/nonexistent/encoder", "true").unwrap();
        let img = linear_ramp(8, 8, 1.0, 2.0).unwrap();
        assert!(matches!(
            codec.compress(img.as_ref(), 1),
            Err(Error::Codec { .. })
        ));
    }

    #[test]
    fn test_timeout_is_a_gap_in_the_sweep() {
        use crate::eval::sweep::{run_sweep, CancelToken, Domain, StepStage, SweepConfig, SweepInput};
        use crate::metrics::MetricConfig;

        // Hangs at Q=22 only; every other Q is a lossless copy.
        let encoder = CommandTemplate::new(
            "sh",
            &[
                "-c",
                r#"if [ "$1" = 22 ]; then sleep 10; fi; cp "$2" "$3""#,
                "sh",
                "{q}",
                "{input}",
                "{output}",
            ],
        );
        let decoder = CommandTemplate::new("cp", &["{input}", "{output}"]);
        let codec = ExternalCommandCodec::from_templates("sometimes-slow", encoder, decoder)
            .with_timeout(Duration::from_millis(500));

        let input = SweepInput::without_ground_truth(linear_ramp(16, 16, 1.0, 255.0).unwrap()).unwrap();
        let config = SweepConfig::builder()
            .q_values(20..25)
            .metrics(MetricConfig::fast())
            .parallel(false)
            .build()
            .unwrap();

        let started = Instant::now();
        let sweep = run_sweep(&codec, &input, Domain::Linear, &config, &CancelToken::new()).unwrap();
        assert!(started.elapsed() < Duration::from_secs(8));
        assert_eq!(sweep.samples.iter().map(|s| s.q).collect::<Vec<_>>(), [20, 21, 23, 24]);
        assert_eq!(sweep.failures.len(), 1);
        assert_eq!(sweep.failures[0].q, 22);
        assert_eq!(sweep.failures[0].stage, StepStage::Pending);
        assert!(sweep.failures[0].reason.contains("timeout"), "{}", sweep.failures[0].reason);
    }

    #[test]
    fn test_timeout_kills_encoder() {
        let codec = ExternalCommandCodec::new("slow", "sleep 5", "true")
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let img = linear_ramp(8, 8, 1.0, 2.0).unwrap();
        let started = Instant::now();
        let result = codec.compress(img.as_ref(), 1);
        assert!(matches!(result, Err(Error::CodecTimeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
