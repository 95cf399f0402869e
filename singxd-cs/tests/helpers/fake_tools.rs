//! Shell stand-ins for the separation, alignment and rendering tools
//!
//! Each script honours the real tool's positional contract:
//! - separation: `$1` input file, `$2` output directory
//! - alignment: `$1` vocals, `$2` lyrics, `$3` output JSON
//! - rendering: `$1` alignment JSON, `$2` sync points JSON, `$3` background,
//!   `$4` instrumental, `$5` vocals, `$6` output video

use std::path::Path;

/// Writes both stems, each a copy of the input
pub const SEPARATE_OK: &str = r#"cat "$1" > "$2/vocals.wav" && cat "$1" > "$2/inst.wav""#;

/// Exits zero without producing the instrumental stem
pub const SEPARATE_NO_INST: &str = r#"cat "$1" > "$2/vocals.wav""#;

/// Fails with diagnostics on stderr
pub const FAIL: &str = "echo 'Traceback: model weights missing' >&2; exit 1";

/// One entry per whitespace-separated lyric token, echoing the text
pub const ALIGN_OK: &str = r#"
i=0; sep=""; out="["
for w in $(cat "$2"); do
  out="$out$sep{\"start\":$i,\"end\":$i.5,\"text\":\"$w\",\"confidence\":0.9}"
  sep=","; i=$((i+1))
done
printf '%s]' "$out" > "$3"
"#;

/// Always reports a single word
pub const ALIGN_SHORT: &str = r#"printf '[{"start":0,"end":1}]' > "$3""#;

/// Emits entries in reverse word order
pub const ALIGN_REVERSED: &str = r#"
i=0; out=""
for w in $(cat "$2"); do
  entry="{\"start\":$i,\"end\":$i.5,\"text\":\"$w\"}"
  if [ -z "$out" ]; then out="$entry"; else out="$entry,$out"; fi
  i=$((i+1))
done
printf '[%s]' "$out" > "$3"
"#;

/// Writes something that is not JSON
pub const ALIGN_GARBAGE: &str = r#"echo 'not json' > "$3""#;

/// Checks every input is a real file, then writes a video
pub const RENDER_OK: &str = r#"
for f in "$1" "$2" "$3" "$4" "$5"; do test -s "$f" || { echo "missing $f" >&2; exit 2; }; done
grep -q firstWordIndex "$1" || { echo "bad alignment" >&2; exit 3; }
printf 'MP4' > "$6"
"#;

/// Sleeps past any reasonable test timeout
pub const SLEEP: &str = "sleep 10";

/// Script that records it ran by touching `marker`
pub fn touch(marker: &Path) -> String {
    format!("touch '{}'", marker.display())
}

/// ALIGN_OK that also copies the lyrics file to `capture`
pub fn align_capturing(capture: &Path) -> String {
    format!("cp \"$2\" '{}'\n{}", capture.display(), ALIGN_OK)
}
