//! 라인 조립 — 로그 청크를 완성된 라인으로 분리하고 정리합니다.
//!
//! Docker 로그 프레임은 라인 경계와 무관하게 잘려서 도착합니다.
//! [`LineSplitter`]는 출력 스트림별로 미완성 라인을 보관하므로
//! stdout과 stderr의 조각이 섞이지 않습니다.

use crate::docker::OutputStream;

/// 라인 앞뒤에서 제거하는 보이지 않는 문자
const INVISIBLE: [char; 3] = ['\u{00A0}', '\u{200B}', '\u{202F}'];

/// 앞뒤 공백, 개행, 보이지 않는 공백 문자를 제거합니다.
pub fn clean_line(line: &str) -> &str {
    line.trim_matches(|c: char| c.is_whitespace() || INVISIBLE.contains(&c))
}

/// 스트림별 라인 분리기
#[derive(Debug)]
pub struct LineSplitter {
    max_line_bytes: usize,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    console: Vec<u8>,
}

impl LineSplitter {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes: max_line_bytes.max(1),
            stdout: Vec::new(),
            stderr: Vec::new(),
            console: Vec::new(),
        }
    }

    fn buffer_mut(&mut self, stream: OutputStream) -> &mut Vec<u8> {
        match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
            OutputStream::Console => &mut self.console,
        }
    }

    /// 청크를 추가하고 완성된 라인을 반환합니다.
    ///
    /// `max_line_bytes`를 넘는 라인은 그 길이에서 강제로 분리됩니다.
    /// 분리 지점이 UTF-8 문자 중간이면 그 문자의 시작으로 당깁니다.
    pub fn push(&mut self, stream: OutputStream, bytes: &[u8]) -> Vec<String> {
        let max = self.max_line_bytes;
        let buf = self.buffer_mut(stream);
        let mut lines = Vec::new();

        for &b in bytes {
            if b == b'\n' {
                lines.push(String::from_utf8_lossy(buf).into_owned());
                buf.clear();
                continue;
            }
            buf.push(b);
            if buf.len() >= max {
                let cut = split_point(buf);
                let rest = buf.split_off(cut);
                lines.push(String::from_utf8_lossy(buf).into_owned());
                *buf = rest;
            }
        }

        lines
    }

    /// 세션 종료 시 남은 미완성 라인을 모두 꺼냅니다.
    pub fn finish(&mut self) -> Vec<String> {
        let mut rest = Vec::new();
        for buf in [&mut self.stdout, &mut self.stderr, &mut self.console] {
            if !buf.is_empty() {
                rest.push(String::from_utf8_lossy(buf).into_owned());
                buf.clear();
            }
        }
        rest
    }
}

/// 강제 분리 위치. 끝에 걸린 미완성 UTF-8 문자는 다음 조각으로 넘깁니다.
fn split_point(buf: &[u8]) -> usize {
    let len = buf.len();
    let tail = len.saturating_sub(4);
    let Some(start) = buf[tail..]
        .iter()
        .rposition(|b| b & 0xC0 != 0x80)
        .map(|i| tail + i)
    else {
        return len;
    };
    let width = match buf[start] {
        0xF0.. => 4,
        0xE0.. => 3,
        0xC0.. => 2,
        _ => 1,
    };
    if start == 0 || len - start >= width {
        len
    } else {
        start
    }
}
