//! BVH text import.
//!
//! The hierarchy block is read token by token with an explicit stack of open
//! blocks; the MOTION block is read line by line so row errors can point at
//! the offending line. Offsets and channels are remapped from file axes to
//! world axes while reading, so the rest of the crate only ever sees world
//! axes.

use std::fs;
use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::config::ParseConfig;
use crate::error::{MotionError, Result};
use crate::ids::JointId;
use crate::skeleton::{Axis, Channel, ChannelFrame, ChannelKind, ChannelLayout, Skeleton, SkeletonBuilder};

/// Which file axis feeds each world axis. The default reads world X from file
/// Z, world Y from file X and world Z from file Y (Y-up capture, Z-up world).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[Axis; 3]", into = "[Axis; 3]")]
pub struct AxisMapping {
    world_from_file: [Axis; 3],
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self {
            world_from_file: [Axis::Z, Axis::X, Axis::Y],
        }
    }
}

impl AxisMapping {
    /// `world_from_file[w]` is the file axis read for world axis `w`.
    pub fn new(world_from_file: [Axis; 3]) -> Result<Self> {
        let mut seen = [false; 3];
        for axis in world_from_file {
            if seen[axis.index()] {
                return Err(MotionError::Config(format!(
                    "axis mapping {world_from_file:?} is not a permutation"
                )));
            }
            seen[axis.index()] = true;
        }
        Ok(Self { world_from_file })
    }

    pub fn identity() -> Self {
        Self {
            world_from_file: Axis::ALL,
        }
    }

    pub fn file_axis(&self, world: Axis) -> Axis {
        self.world_from_file[world.index()]
    }

    pub fn world_axis(&self, file: Axis) -> Axis {
        Axis::ALL
            .into_iter()
            .find(|w| self.world_from_file[w.index()] == file)
            .unwrap_or(file)
    }

    pub fn map_vector(&self, file: DVec3) -> DVec3 {
        DVec3::new(
            file[self.world_from_file[0].index()],
            file[self.world_from_file[1].index()],
            file[self.world_from_file[2].index()],
        )
    }

    /// +1 for even permutations, -1 for odd ones. An odd mapping mirrors the
    /// space, which flips the sense of every rotation angle.
    pub fn rotation_sign(&self) -> f64 {
        let p = self.world_from_file.map(Axis::index);
        let mut inversions = 0;
        for i in 0..3 {
            for j in (i + 1)..3 {
                if p[i] > p[j] {
                    inversions += 1;
                }
            }
        }
        if inversions % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }
}

impl TryFrom<[Axis; 3]> for AxisMapping {
    type Error = MotionError;

    fn try_from(value: [Axis; 3]) -> Result<Self> {
        AxisMapping::new(value)
    }
}

impl From<AxisMapping> for [Axis; 3] {
    fn from(value: AxisMapping) -> Self {
        value.world_from_file
    }
}

/// Result of reading a BVH document.
#[derive(Clone, Debug)]
pub struct ParsedBvh {
    pub skeleton: Skeleton,
    /// Captured frames; zero for a static pose import.
    pub frame_count: usize,
    pub frame_time: f64,
    /// True when the MOTION section was missing or its frame count unreadable.
    pub is_static: bool,
}

/// Read and parse a BVH file. Parse errors carry the file path.
pub fn load_bvh(path: impl AsRef<Path>, cfg: &ParseConfig) -> Result<ParsedBvh> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| MotionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_bvh(&text, cfg).map_err(|e| e.with_path(path.to_path_buf()))
}

/// Parse BVH text already in memory.
pub fn parse_bvh(text: &str, cfg: &ParseConfig) -> Result<ParsedBvh> {
    let lines: Vec<Vec<&str>> = text
        .lines()
        .map(|l| l.split_whitespace().collect())
        .collect();

    let mut parser = HierarchyParser::new(&lines, cfg.axis_mapping);
    let motion_line = parser.run()?;
    let HierarchyParser {
        mut builder,
        declared,
        ..
    } = parser;

    let Some(motion_line) = motion_line else {
        log::warn!("bvh has no MOTION section; importing the rest pose as a static clip");
        return Ok(ParsedBvh {
            skeleton: builder.build().map_err(|e| hierarchy_error(lines.len(), e))?,
            frame_count: 0,
            frame_time: cfg.default_frame_time,
            is_static: true,
        });
    };

    let motion = read_motion_header(&lines, motion_line, cfg);
    let frame_count = match motion.frames {
        Some(n) => n,
        None => {
            log::warn!(
                "line {}: unreadable frame count; importing the rest pose as a static clip",
                motion.frames_line + 1
            );
            return Ok(ParsedBvh {
                skeleton: builder.build().map_err(|e| hierarchy_error(motion_line + 1, e))?,
                frame_count: 0,
                frame_time: motion.frame_time,
                is_static: true,
            });
        }
    };

    let width: usize = declared.iter().map(|(_, layout)| layout.len()).sum();
    let sign = cfg.axis_mapping.rotation_sign();
    let mut rows = 0usize;
    for (idx, tokens) in lines.iter().enumerate().skip(motion.data_start) {
        if tokens.is_empty() {
            continue;
        }
        let line = idx + 1;
        if rows == frame_count {
            log::warn!("line {line}: ignoring rows beyond the declared {frame_count} frames");
            break;
        }
        if tokens.len() != width {
            return Err(MotionError::parse(
                line,
                format!("frame row has {} values, expected {width}", tokens.len()),
            ));
        }
        let mut values = tokens.iter().map(|t| {
            t.parse::<f64>()
                .map_err(|_| MotionError::parse(line, format!("invalid number '{t}'")))
        });
        for (joint, layout) in &declared {
            let mut frame: ChannelFrame = [0.0; 6];
            for channel in layout.channels() {
                let v = values
                    .next()
                    .ok_or_else(|| MotionError::parse(line, "frame row ended early"))??;
                frame[channel.slot()] = match channel.kind {
                    ChannelKind::Position => v,
                    ChannelKind::Rotation => v * sign,
                };
            }
            builder.push_frame(*joint, frame);
        }
        rows += 1;
    }
    if rows < frame_count {
        return Err(MotionError::parse(
            lines.len(),
            format!("expected {frame_count} frames, found {rows}"),
        ));
    }

    let skeleton = builder
        .build()
        .map_err(|e| hierarchy_error(motion_line + 1, e))?;
    log::debug!(
        "parsed bvh: {} joints, {} frames at {:.4}s",
        skeleton.len(),
        frame_count,
        motion.frame_time
    );
    Ok(ParsedBvh {
        skeleton,
        frame_count,
        frame_time: motion.frame_time,
        is_static: false,
    })
}

fn hierarchy_error(line: usize, err: MotionError) -> MotionError {
    match err {
        MotionError::InvalidInput(message) => MotionError::parse(line, message),
        other => other,
    }
}

struct MotionHeader {
    frames: Option<usize>,
    frames_line: usize,
    frame_time: f64,
    data_start: usize,
}

fn read_motion_header(lines: &[Vec<&str>], motion_line: usize, cfg: &ParseConfig) -> MotionHeader {
    let mut idx = motion_line + 1;
    // Skip blanks between MOTION and Frames:.
    while idx < lines.len() && lines[idx].is_empty() {
        idx += 1;
    }
    let frames_line = idx;
    let mut frames = None;
    if let Some(tokens) = lines.get(idx) {
        if let Some(first) = tokens.first() {
            if first.to_ascii_lowercase().starts_with("frames") {
                frames = keyword_value(tokens, "frames:").and_then(|v| v.parse::<usize>().ok());
                idx += 1;
            }
        }
    }

    let mut frame_time = None;
    if let Some(tokens) = lines.get(idx) {
        if tokens
            .first()
            .map(|t| t.eq_ignore_ascii_case("frame"))
            .unwrap_or(false)
        {
            frame_time = tokens
                .iter()
                .skip(1)
                .find_map(|t| t.parse::<f64>().ok())
                .filter(|t| t.is_finite() && *t > 0.0);
            idx += 1;
        }
    }
    let frame_time = match frame_time {
        Some(t) => t,
        None => {
            log::warn!(
                "line {}: unreadable frame time; using {:.4}s",
                idx + 1,
                cfg.default_frame_time
            );
            cfg.default_frame_time
        }
    };

    MotionHeader {
        frames,
        frames_line,
        frame_time,
        data_start: idx,
    }
}

/// Value following a `Keyword:` token, tolerating `Keyword:value`.
fn keyword_value<'a>(tokens: &[&'a str], keyword: &str) -> Option<&'a str> {
    let first = *tokens.first()?;
    let lower = first.to_ascii_lowercase();
    if lower == keyword {
        tokens.get(1).copied()
    } else if lower.starts_with(keyword) {
        Some(&first[keyword.len()..])
    } else {
        None
    }
}

enum Block {
    Joint(JointId),
    EndSite,
}

struct HierarchyParser<'a> {
    lines: &'a [Vec<&'a str>],
    line: usize,
    col: usize,
    mapping: AxisMapping,
    builder: SkeletonBuilder,
    /// Joints in declaration order with their layouts, i.e. frame row order.
    declared: Vec<(JointId, ChannelLayout)>,
    stack: Vec<Block>,
}

impl<'a> HierarchyParser<'a> {
    fn new(lines: &'a [Vec<&'a str>], mapping: AxisMapping) -> Self {
        Self {
            lines,
            line: 0,
            col: 0,
            mapping,
            builder: SkeletonBuilder::default(),
            declared: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// 1-based line of the token most recently returned.
    fn current_line(&self) -> usize {
        self.line + 1
    }

    fn next(&mut self) -> Option<(usize, &'a str)> {
        let lines = self.lines;
        while self.line < lines.len() {
            if let Some(tok) = lines[self.line].get(self.col) {
                self.col += 1;
                return Some((self.line + 1, *tok));
            }
            self.line += 1;
            self.col = 0;
        }
        None
    }

    fn expect_token(&mut self, what: &str) -> Result<(usize, &'a str)> {
        let last = self.current_line();
        self.next()
            .ok_or_else(|| MotionError::parse(last, format!("unexpected end of file, expected {what}")))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<usize> {
        let (line, tok) = self.expect_token(keyword)?;
        if tok.eq_ignore_ascii_case(keyword) {
            Ok(line)
        } else {
            Err(MotionError::parse(line, format!("expected {keyword}, found '{tok}'")))
        }
    }

    fn expect_f64(&mut self, what: &str) -> Result<f64> {
        let (line, tok) = self.expect_token(what)?;
        tok.parse::<f64>()
            .map_err(|_| MotionError::parse(line, format!("invalid {what} '{tok}'")))
    }

    fn read_offset(&mut self) -> Result<DVec3> {
        self.expect_keyword("OFFSET")?;
        let x = self.expect_f64("offset")?;
        let y = self.expect_f64("offset")?;
        let z = self.expect_f64("offset")?;
        Ok(self.mapping.map_vector(DVec3::new(x, y, z)))
    }

    /// Remaining tokens on `line` up to an opening brace, joined by spaces.
    fn read_name(&mut self, line: usize) -> Result<String> {
        let mut parts = Vec::new();
        while self.line + 1 == line {
            match self.lines[self.line].get(self.col) {
                Some(tok) if *tok != "{" => {
                    parts.push(*tok);
                    self.col += 1;
                }
                _ => break,
            }
        }
        if parts.is_empty() {
            return Err(MotionError::parse(line, "joint without a name"));
        }
        Ok(parts.join(" "))
    }

    fn read_channels(&mut self) -> Result<ChannelLayout> {
        let line = self.expect_keyword("CHANNELS")?;
        let (count_line, count_tok) = self.expect_token("channel count")?;
        let count: usize = count_tok
            .parse()
            .map_err(|_| MotionError::parse(count_line, format!("invalid channel count '{count_tok}'")))?;
        if count > 6 {
            return Err(MotionError::parse(count_line, format!("{count} channels declared, at most 6 allowed")));
        }
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            let (l, tok) = self.expect_token("channel name")?;
            if l != line {
                return Err(MotionError::parse(
                    line,
                    format!("CHANNELS declares {count} channels but lists {}", channels.len()),
                ));
            }
            channels.push(self.map_channel(l, tok)?);
        }
        if self.line + 1 == line && self.col < self.lines[self.line].len() {
            return Err(MotionError::parse(
                line,
                format!("CHANNELS declares {count} channels but lists more"),
            ));
        }
        ChannelLayout::new(channels).map_err(|e| hierarchy_error(line, e))
    }

    fn map_channel(&self, line: usize, name: &str) -> Result<Channel> {
        let lower = name.to_ascii_lowercase();
        let axis = match lower.get(..1) {
            Some("x") => Axis::X,
            Some("y") => Axis::Y,
            Some("z") => Axis::Z,
            _ => return Err(MotionError::parse(line, format!("unknown channel '{name}'"))),
        };
        let rest = &lower[1..];
        let world = self.mapping.world_axis(axis);
        match rest {
            "position" => Ok(Channel::position(world)),
            "rotation" => Ok(Channel::rotation(world)),
            _ => Err(MotionError::parse(line, format!("unknown channel '{name}'"))),
        }
    }

    fn open_joint(&mut self, line: usize, is_root: bool) -> Result<()> {
        let parent = match self.stack.last() {
            None if is_root => None,
            None => return Err(MotionError::parse(line, "JOINT outside of ROOT")),
            Some(_) if is_root => return Err(MotionError::parse(line, "ROOT nested inside another joint")),
            Some(Block::Joint(id)) => Some(*id),
            Some(Block::EndSite) => return Err(MotionError::parse(line, "JOINT inside End Site")),
        };
        if is_root && !self.builder.is_empty() {
            return Err(MotionError::parse(line, "more than one ROOT"));
        }
        let name = self.read_name(line)?;
        self.expect_keyword("{")?;
        let offset = self.read_offset()?;
        let layout = self.read_channels()?;
        let id = self
            .builder
            .add_joint(parent, &name, offset, layout.clone())
            .map_err(|e| hierarchy_error(line, e))?;
        self.declared.push((id, layout));
        self.stack.push(Block::Joint(id));
        Ok(())
    }

    fn open_end_site(&mut self, line: usize) -> Result<()> {
        let joint = match self.stack.last() {
            Some(Block::Joint(id)) => *id,
            _ => return Err(MotionError::parse(line, "End Site outside of a joint")),
        };
        self.expect_keyword("Site")?;
        self.expect_keyword("{")?;
        let offset = self.read_offset()?;
        self.builder.set_end_site(joint, offset);
        self.stack.push(Block::EndSite);
        Ok(())
    }

    /// Parse up to the MOTION keyword; returns its 0-based line index.
    fn run(&mut self) -> Result<Option<usize>> {
        match self.next() {
            Some((_, tok)) if tok.eq_ignore_ascii_case("HIERARCHY") => {}
            Some((line, _)) => return Err(MotionError::parse(line, "not a BVH file: missing HIERARCHY")),
            None => return Err(MotionError::parse(1, "empty BVH document")),
        }

        while let Some((line, tok)) = self.next() {
            match tok.to_ascii_lowercase().as_str() {
                "root" => self.open_joint(line, true)?,
                "joint" => self.open_joint(line, false)?,
                "end" => self.open_end_site(line)?,
                "}" => {
                    if self.stack.pop().is_none() {
                        return Err(MotionError::parse(line, "unbalanced '}'"));
                    }
                }
                "motion" => {
                    if !self.stack.is_empty() {
                        return Err(MotionError::parse(line, "MOTION before the hierarchy was closed"));
                    }
                    if self.builder.is_empty() {
                        return Err(MotionError::parse(line, "hierarchy declares no ROOT"));
                    }
                    return Ok(Some(line - 1));
                }
                _ => return Err(MotionError::parse(line, format!("unexpected token '{tok}'"))),
            }
        }

        if !self.stack.is_empty() {
            return Err(MotionError::parse(
                self.lines.len().max(1),
                "unexpected end of file inside the hierarchy",
            ));
        }
        if self.builder.is_empty() {
            return Err(MotionError::parse(self.lines.len().max(1), "hierarchy declares no ROOT"));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_JOINTS: &str = "HIERARCHY
ROOT Hips
{
  OFFSET 0 0 0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT Chest
  {
    OFFSET 0 10 0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0 5 0
    }
  }
}
MOTION
Frames: 2
Frame Time: 0.04
1 2 3 0 0 0 0 0 0
4 5 6 10 20 30 0 0 0
";

    #[test]
    fn default_mapping_is_cyclic() {
        let m = AxisMapping::default();
        assert_eq!(m.rotation_sign(), 1.0);
        assert_eq!(m.map_vector(DVec3::new(1.0, 2.0, 3.0)), DVec3::new(3.0, 1.0, 2.0));
        assert_eq!(m.world_axis(Axis::X), Axis::Y);
        assert_eq!(m.file_axis(Axis::X), Axis::Z);
    }

    #[test]
    fn swapping_two_axes_mirrors_rotations() {
        let m = AxisMapping::new([Axis::Y, Axis::X, Axis::Z]).unwrap();
        assert_eq!(m.rotation_sign(), -1.0);
        assert!(AxisMapping::new([Axis::X, Axis::X, Axis::Z]).is_err());
    }

    #[test]
    fn parses_channels_into_world_axes() {
        let parsed = parse_bvh(TWO_JOINTS, &ParseConfig::default()).unwrap();
        assert_eq!(parsed.frame_count, 2);
        assert!((parsed.frame_time - 0.04).abs() < 1e-12);
        let skel = &parsed.skeleton;
        let hips = skel.root_joint();
        // File (4,5,6) -> world (6,4,5); file Z/X/Y rotations -> world X/Y/Z.
        assert_eq!(hips.frames[2], [6.0, 4.0, 5.0, 10.0, 20.0, 30.0]);
        let chest = skel.joint(skel.require("Chest").unwrap());
        assert_eq!(chest.local_head, DVec3::new(0.0, 0.0, 10.0));
        assert_eq!(chest.tail_offset(), DVec3::new(0.0, 0.0, 5.0));
        let order: Vec<Axis> = chest.layout.rotation_order().iter().map(|s| s.axis).collect();
        assert_eq!(order, vec![Axis::X, Axis::Y, Axis::Z]);
    }

    #[test]
    fn identity_mapping_keeps_file_axes() {
        let cfg = ParseConfig {
            axis_mapping: AxisMapping::identity(),
            ..ParseConfig::default()
        };
        let parsed = parse_bvh(TWO_JOINTS, &cfg).unwrap();
        assert_eq!(parsed.skeleton.root_joint().frames[1], [1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_hierarchy_keyword_is_fatal() {
        let err = parse_bvh("SKELETON\nROOT A\n", &ParseConfig::default()).unwrap_err();
        match err {
            MotionError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn keyword_case_is_ignored() {
        let text = TWO_JOINTS
            .replace("HIERARCHY", "hierarchy")
            .replace("End Site", "end site")
            .replace("MOTION", "Motion");
        assert!(parse_bvh(&text, &ParseConfig::default()).is_ok());
    }

    #[test]
    fn unreadable_frame_count_imports_static_pose() {
        let text = TWO_JOINTS.replace("Frames: 2", "Frames: lots");
        let parsed = parse_bvh(&text, &ParseConfig::default()).unwrap();
        assert!(parsed.is_static);
        assert_eq!(parsed.frame_count, 0);
        assert_eq!(parsed.skeleton.slot_count(), 1);
    }

    #[test]
    fn short_row_reports_its_line() {
        let text = TWO_JOINTS.replace("4 5 6 10 20 30 0 0 0", "4 5 6 10 20 30 0 0");
        match parse_bvh(&text, &ParseConfig::default()).unwrap_err() {
            MotionError::Parse { line, message, .. } => {
                assert_eq!(line, 20);
                assert!(message.contains("expected 9"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_rows_are_an_error() {
        let text = TWO_JOINTS.replace("Frames: 2", "Frames: 3");
        assert!(matches!(
            parse_bvh(&text, &ParseConfig::default()),
            Err(MotionError::Parse { .. })
        ));
    }

    #[test]
    fn second_root_rejected() {
        let text = TWO_JOINTS.replace(
            "MOTION",
            "ROOT Other\n{\n OFFSET 0 0 0\n CHANNELS 0\n}\nMOTION",
        );
        let err = parse_bvh(&text, &ParseConfig::default()).unwrap_err();
        assert!(err.to_string().contains("more than one ROOT"), "{err}");
    }

    #[test]
    fn channel_count_mismatch_rejected() {
        let text = TWO_JOINTS.replace("CHANNELS 3 Zrotation", "CHANNELS 2 Zrotation");
        assert!(parse_bvh(&text, &ParseConfig::default()).is_err());
    }

    #[test]
    fn truncated_hierarchy_rejected() {
        let text = "HIERARCHY\nROOT Hips\n{\n OFFSET 0 0 0\n CHANNELS 0\n";
        assert!(matches!(
            parse_bvh(text, &ParseConfig::default()),
            Err(MotionError::Parse { .. })
        ));
    }
}
