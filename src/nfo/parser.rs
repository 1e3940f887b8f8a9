//! Descriptor parsing: decoded text -> [`MovieNfo`].

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::encoding::decode_descriptor_bytes;
use super::repair::repair_markup;
use super::{MovieNfo, NfoError};

/// Read and parse a descriptor file from disk.
pub fn read_movie_nfo(path: &Path) -> Result<MovieNfo, NfoError> {
    let bytes = std::fs::read(path)?;
    let content = decode_descriptor_bytes(&bytes);
    parse_movie_nfo(&content)
}

/// Parse decoded descriptor text into a normalized record.
///
/// The movie element is located whether it is the document root or nested
/// one level down; legacy files vary. Scalar fields take the first
/// occurrence, list fields (`actor`, `genre`) accumulate, and the natural
/// code is read from `uniqueid` then `num`, first non-empty wins.
pub fn parse_movie_nfo(content: &str) -> Result<MovieNfo, NfoError> {
    let repaired = repair_markup(content);
    let mut reader = Reader::from_str(&repaired);
    reader.config_mut().trim_text(true);

    let mut nfo = MovieNfo::default();
    let mut uniqueid: Option<String> = None;
    let mut num: Option<String> = None;
    let mut pending_actor_name: Option<String> = None;

    // Element name stack; `movie_depth` is the stack depth of the movie
    // element once seen, so fields are recognized at movie_depth + 1.
    let mut stack: Vec<String> = Vec::new();
    let mut movie_depth: Option<usize> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name =
                    String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
                stack.push(name);
                if movie_depth.is_none()
                    && stack.len() <= 2
                    && stack.last().map(String::as_str) == Some("movie")
                {
                    movie_depth = Some(stack.len());
                }
                text.clear();
            }
            Ok(Event::Text(t)) => {
                let fragment = t
                    .unescape()
                    .map_err(|e| NfoError::Malformed(e.to_string()))?;
                text.push_str(&fragment);
            }
            Ok(Event::CData(c)) => {
                text.push_str(&String::from_utf8_lossy(c.as_ref()));
            }
            Ok(Event::End(_)) => {
                let depth = stack.len();
                let base = movie_depth.unwrap_or(1);
                let name = stack.last().cloned().unwrap_or_default();
                let value = text.trim().to_string();

                if depth == base + 2
                    && name == "name"
                    && stack.get(depth - 2).map(String::as_str) == Some("actor")
                {
                    pending_actor_name = Some(value);
                } else if depth == base + 1 {
                    match name.as_str() {
                        "title" => {
                            if nfo.title.is_empty() {
                                nfo.title = value;
                            }
                        }
                        "uniqueid" => {
                            if uniqueid.is_none() {
                                uniqueid = Some(value);
                            }
                        }
                        "num" => {
                            if num.is_none() {
                                num = Some(value);
                            }
                        }
                        "runtime" => {
                            if nfo.runtime.is_none() {
                                nfo.runtime = parse_leading_u32(&value);
                            }
                        }
                        "premiered" => {
                            if nfo.premiered.is_none() && !value.is_empty() {
                                nfo.premiered = Some(value);
                            }
                        }
                        "director" => {
                            if nfo.director.is_none() && !value.is_empty() {
                                nfo.director = Some(value);
                            }
                        }
                        "studio" => {
                            if nfo.studio.is_none() && !value.is_empty() {
                                nfo.studio = Some(value);
                            }
                        }
                        "actor" => {
                            let actor = pending_actor_name.take().unwrap_or(value);
                            if !actor.is_empty() {
                                nfo.actors.push(actor);
                            }
                        }
                        "genre" => {
                            if !value.is_empty() {
                                nfo.genres.push(value);
                            }
                        }
                        _ => {}
                    }
                }

                stack.pop();
                text.clear();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(NfoError::Malformed(e.to_string())),
        }
    }

    let code = uniqueid
        .filter(|c| !c.is_empty())
        .or(num.filter(|c| !c.is_empty()));
    match code {
        Some(code) => {
            nfo.code = code;
            Ok(nfo)
        }
        None => Err(NfoError::MissingCode),
    }
}

/// Lenient integer parse: take the leading digit run, so "90 min" reads as
/// 90 the way the original data does.
fn parse_leading_u32(value: &str) -> Option<u32> {
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
