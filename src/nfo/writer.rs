//! Descriptor writing: full regeneration and targeted partial updates.
//!
//! The partial path streams the existing document event by event, rewriting
//! only the patched nodes and passing everything else (comments, unknown
//! elements, the exact text between nodes) through untouched. Any structural
//! failure falls back to regenerating the whole document from the complete
//! normalized record.

use std::io::Write as _;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::warn;

use super::encoding::decode_descriptor_bytes;
use super::{MovieNfo, NfoError, NfoPatch, EMPTY_FIELD};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Regenerate a descriptor file from a complete record.
///
/// Output is UTF-8 with a BOM, two-space indented, matching the layout the
/// scrapers in this collection produce.
pub fn write_movie_nfo(path: &Path, nfo: &MovieNfo) -> Result<(), NfoError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("movie");
    root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    root.push_attribute(("xmlns:xsd", "http://www.w3.org/2001/XMLSchema"));
    writer.write_event(Event::Start(root))?;

    write_text_element(&mut writer, "title", &nfo.title)?;
    if let Some(runtime) = nfo.runtime {
        write_text_element(&mut writer, "runtime", &runtime.to_string())?;
    }

    let mut uniqueid = BytesStart::new("uniqueid");
    uniqueid.push_attribute(("type", "num"));
    uniqueid.push_attribute(("default", "true"));
    writer.write_event(Event::Start(uniqueid))?;
    writer.write_event(Event::Text(BytesText::new(&nfo.code)))?;
    writer.write_event(Event::End(BytesEnd::new("uniqueid")))?;

    for genre in &nfo.genres {
        write_text_element(&mut writer, "genre", genre)?;
    }
    if !nfo.genres.is_empty() {
        write_text_element(&mut writer, "tag", &nfo.genres.join(" / "))?;
    }

    write_text_element(
        &mut writer,
        "director",
        nfo.director.as_deref().unwrap_or(EMPTY_FIELD),
    )?;
    if let Some(premiered) = &nfo.premiered {
        write_text_element(&mut writer, "premiered", premiered)?;
    }
    write_text_element(
        &mut writer,
        "studio",
        nfo.studio.as_deref().unwrap_or(EMPTY_FIELD),
    )?;

    for actor in &nfo.actors {
        writer.write_event(Event::Start(BytesStart::new("actor")))?;
        write_text_element(&mut writer, "name", actor)?;
        writer.write_event(Event::End(BytesEnd::new("actor")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("movie")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(UTF8_BOM)?;
    file.write_all(&writer.into_inner())?;
    Ok(())
}

/// Update a descriptor in place, touching only the fields named in `patch`.
///
/// `full` must be the complete record with the patch already applied; it is
/// used when the targeted edit cannot be performed and the document has to
/// be regenerated instead.
pub fn update_movie_nfo(path: &Path, full: &MovieNfo, patch: &NfoPatch) -> Result<(), NfoError> {
    match try_partial_update(path, patch) {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "targeted descriptor update failed, regenerating document"
            );
            write_movie_nfo(path, full)
        }
    }
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Which scalar fields of the original document have been rewritten so far.
#[derive(Default)]
struct SeenFields {
    title: bool,
    code: bool,
    runtime: bool,
    premiered: bool,
    director: bool,
    studio: bool,
    actors: bool,
    genres: bool,
    tags: bool,
}

fn try_partial_update(path: &Path, patch: &NfoPatch) -> Result<(), NfoError> {
    let bytes = std::fs::read(path)?;
    let content = decode_descriptor_bytes(&bytes);

    let mut reader = Reader::from_str(&content);
    let mut writer = Writer::new(Vec::new());

    let mut depth = 0usize;
    let mut root_seen = false;
    let mut seen = SeenFields::default();
    // Drop a whitespace-only text node right after a removed element so
    // edits do not leave blank lines behind.
    let mut swallow_ws = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| NfoError::Malformed(e.to_string()))?;
        match event {
            Event::Start(start) => {
                swallow_ws = false;
                if depth == 0 {
                    if start.name().as_ref() != b"movie" {
                        return Err(NfoError::Malformed(
                            "root element is not <movie>".to_string(),
                        ));
                    }
                    root_seen = true;
                    depth += 1;
                    writer.write_event(Event::Start(start))?;
                    continue;
                }

                if depth == 1 {
                    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                    match name.as_str() {
                        "title" => {
                            if let Some(title) = &patch.title {
                                seen.title = true;
                                replace_element_text(&mut reader, &mut writer, &start, title)?;
                                continue;
                            }
                        }
                        "runtime" => {
                            if let Some(runtime) = &patch.runtime {
                                seen.runtime = true;
                                match runtime {
                                    Some(value) => replace_element_text(
                                        &mut reader,
                                        &mut writer,
                                        &start,
                                        &value.to_string(),
                                    )?,
                                    None => {
                                        skip_element(&mut reader, &start)?;
                                        swallow_ws = true;
                                    }
                                }
                                continue;
                            }
                        }
                        "premiered" => {
                            if let Some(premiered) = &patch.premiered {
                                seen.premiered = true;
                                match premiered {
                                    Some(value) => replace_element_text(
                                        &mut reader,
                                        &mut writer,
                                        &start,
                                        value,
                                    )?,
                                    None => {
                                        skip_element(&mut reader, &start)?;
                                        swallow_ws = true;
                                    }
                                }
                                continue;
                            }
                        }
                        "director" => {
                            if let Some(director) = &patch.director {
                                seen.director = true;
                                let value = director.as_deref().unwrap_or(EMPTY_FIELD);
                                replace_element_text(&mut reader, &mut writer, &start, value)?;
                                continue;
                            }
                        }
                        "studio" => {
                            if let Some(studio) = &patch.studio {
                                seen.studio = true;
                                let value = studio.as_deref().unwrap_or(EMPTY_FIELD);
                                replace_element_text(&mut reader, &mut writer, &start, value)?;
                                continue;
                            }
                        }
                        "uniqueid" => {
                            if let Some(code) = &patch.code {
                                seen.code = true;
                                replace_uniqueid(&mut reader, &mut writer, &start, code)?;
                                continue;
                            }
                        }
                        "num" => {
                            if let Some(code) = &patch.code {
                                seen.code = true;
                                replace_element_text(&mut reader, &mut writer, &start, code)?;
                                continue;
                            }
                        }
                        "actor" => {
                            if let Some(actors) = &patch.actors {
                                if !seen.actors {
                                    seen.actors = true;
                                    write_actor_elements(&mut writer, actors)?;
                                } else {
                                    swallow_ws = true;
                                }
                                skip_element(&mut reader, &start)?;
                                continue;
                            }
                        }
                        "genre" => {
                            if let Some(genres) = &patch.genres {
                                if !seen.genres {
                                    seen.genres = true;
                                    write_text_elements(&mut writer, "genre", genres)?;
                                } else {
                                    swallow_ws = true;
                                }
                                skip_element(&mut reader, &start)?;
                                continue;
                            }
                        }
                        "tag" => {
                            if let Some(genres) = &patch.genres {
                                if !seen.tags {
                                    seen.tags = true;
                                    write_text_elements(&mut writer, "tag", genres)?;
                                } else {
                                    swallow_ws = true;
                                }
                                skip_element(&mut reader, &start)?;
                                continue;
                            }
                        }
                        _ => {}
                    }
                }

                depth += 1;
                writer.write_event(Event::Start(start))?;
            }
            Event::Empty(empty) => {
                swallow_ws = false;
                if depth == 1 {
                    let name = String::from_utf8_lossy(empty.name().as_ref()).to_string();
                    if let Some(replacement) = empty_element_replacement(&name, patch, &mut seen)
                    {
                        match replacement {
                            Some(value) => {
                                let original_name =
                                    String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                                writer.write_event(Event::Start(BytesStart::new(
                                    original_name.as_str(),
                                )))?;
                                writer.write_event(Event::Text(BytesText::new(&value)))?;
                                writer
                                    .write_event(Event::End(BytesEnd::new(original_name)))?;
                            }
                            None => {
                                swallow_ws = true;
                            }
                        }
                        continue;
                    }
                }
                writer.write_event(Event::Empty(empty))?;
            }
            Event::End(end) => {
                swallow_ws = false;
                if depth == 1 {
                    append_missing_fields(&mut writer, patch, &seen)?;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(end))?;
            }
            Event::Text(text) => {
                if swallow_ws {
                    swallow_ws = false;
                    let raw = String::from_utf8_lossy(text.as_ref()).into_owned();
                    if raw.chars().all(char::is_whitespace) {
                        continue;
                    }
                }
                writer.write_event(Event::Text(text))?;
            }
            Event::Eof => break,
            other => {
                swallow_ws = false;
                writer.write_event(other)?;
            }
        }
    }

    if !root_seen {
        return Err(NfoError::Malformed("document has no root element".to_string()));
    }

    let mut file = std::fs::File::create(path)?;
    file.write_all(UTF8_BOM)?;
    file.write_all(&writer.into_inner())?;
    Ok(())
}

/// Decide how a self-closing element at the field level is affected by the
/// patch. Outer `None` = not patched, pass through; `Some(None)` = drop the
/// element; `Some(Some(text))` = replace with a text element.
fn empty_element_replacement(
    name: &str,
    patch: &NfoPatch,
    seen: &mut SeenFields,
) -> Option<Option<String>> {
    match name {
        "title" => patch.title.as_ref().map(|t| {
            seen.title = true;
            Some(t.clone())
        }),
        "runtime" => patch.runtime.as_ref().map(|r| {
            seen.runtime = true;
            r.map(|v| v.to_string())
        }),
        "premiered" => patch.premiered.as_ref().map(|p| {
            seen.premiered = true;
            p.clone()
        }),
        "director" => patch.director.as_ref().map(|d| {
            seen.director = true;
            Some(d.clone().unwrap_or_else(|| EMPTY_FIELD.to_string()))
        }),
        "studio" => patch.studio.as_ref().map(|s| {
            seen.studio = true;
            Some(s.clone().unwrap_or_else(|| EMPTY_FIELD.to_string()))
        }),
        "uniqueid" | "num" => patch.code.as_ref().map(|c| {
            seen.code = true;
            Some(c.clone())
        }),
        _ => None,
    }
}

/// Write the original start tag, the new text, and the end tag, discarding
/// whatever content the element previously had.
fn replace_element_text(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    start: &BytesStart<'_>,
    text: &str,
) -> Result<(), NfoError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    writer.write_event(Event::Start(start.to_owned()))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    skip_inner(reader, start)?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Rebuild a `uniqueid` element with `type="num" default="true"`, keeping
/// any other attributes the original carried.
fn replace_uniqueid(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    start: &BytesStart<'_>,
    code: &str,
) -> Result<(), NfoError> {
    let mut rebuilt = BytesStart::new("uniqueid");
    for attr in start.attributes().flatten() {
        let key = attr.key.as_ref();
        if key != b"type" && key != b"default" {
            rebuilt.push_attribute(attr);
        }
    }
    rebuilt.push_attribute(("type", "num"));
    rebuilt.push_attribute(("default", "true"));

    writer.write_event(Event::Start(rebuilt))?;
    writer.write_event(Event::Text(BytesText::new(code)))?;
    skip_inner(reader, start)?;
    writer.write_event(Event::End(BytesEnd::new("uniqueid")))?;
    Ok(())
}

/// Consume events up to and including the end tag matching `start`.
fn skip_inner(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<(), NfoError> {
    reader
        .read_to_end(start.name())
        .map_err(|e| NfoError::Malformed(e.to_string()))?;
    Ok(())
}

/// Consume an element without writing anything.
fn skip_element(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<(), NfoError> {
    skip_inner(reader, start)
}

fn write_actor_elements(
    writer: &mut Writer<Vec<u8>>,
    actors: &[String],
) -> Result<(), NfoError> {
    for (index, actor) in actors.iter().enumerate() {
        if index > 0 {
            writer.write_event(Event::Text(BytesText::from_escaped("\n  ")))?;
        }
        writer.write_event(Event::Start(BytesStart::new("actor")))?;
        writer.write_event(Event::Start(BytesStart::new("name")))?;
        writer.write_event(Event::Text(BytesText::new(actor)))?;
        writer.write_event(Event::End(BytesEnd::new("name")))?;
        writer.write_event(Event::End(BytesEnd::new("actor")))?;
    }
    Ok(())
}

fn write_text_elements(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    values: &[String],
) -> Result<(), NfoError> {
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            writer.write_event(Event::Text(BytesText::from_escaped("\n  ")))?;
        }
        writer.write_event(Event::Start(BytesStart::new(name)))?;
        writer.write_event(Event::Text(BytesText::new(value)))?;
        writer.write_event(Event::End(BytesEnd::new(name)))?;
    }
    Ok(())
}

/// Create elements for patched fields the original document never had,
/// right before the closing root tag.
fn append_missing_fields(
    writer: &mut Writer<Vec<u8>>,
    patch: &NfoPatch,
    seen: &SeenFields,
) -> Result<(), NfoError> {
    let lead_in = |writer: &mut Writer<Vec<u8>>| -> std::io::Result<()> {
        writer.write_event(Event::Text(BytesText::from_escaped("  ")))
    };

    if let (Some(title), false) = (&patch.title, seen.title) {
        lead_in(writer)?;
        write_text_element(writer, "title", title)?;
        writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    }
    if let (Some(code), false) = (&patch.code, seen.code) {
        lead_in(writer)?;
        let mut uniqueid = BytesStart::new("uniqueid");
        uniqueid.push_attribute(("type", "num"));
        uniqueid.push_attribute(("default", "true"));
        writer.write_event(Event::Start(uniqueid))?;
        writer.write_event(Event::Text(BytesText::new(code)))?;
        writer.write_event(Event::End(BytesEnd::new("uniqueid")))?;
        writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    }
    if let (Some(Some(runtime)), false) = (&patch.runtime, seen.runtime) {
        lead_in(writer)?;
        write_text_element(writer, "runtime", &runtime.to_string())?;
        writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    }
    if let (Some(Some(premiered)), false) = (&patch.premiered, seen.premiered) {
        lead_in(writer)?;
        write_text_element(writer, "premiered", premiered)?;
        writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    }
    if let (Some(director), false) = (&patch.director, seen.director) {
        lead_in(writer)?;
        let value = director.as_deref().unwrap_or(EMPTY_FIELD);
        write_text_element(writer, "director", value)?;
        writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    }
    if let (Some(studio), false) = (&patch.studio, seen.studio) {
        lead_in(writer)?;
        let value = studio.as_deref().unwrap_or(EMPTY_FIELD);
        write_text_element(writer, "studio", value)?;
        writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    }
    if let (Some(genres), false) = (&patch.genres, seen.genres) {
        if !genres.is_empty() {
            lead_in(writer)?;
            write_text_elements(writer, "genre", genres)?;
            writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
            }
    }
    if let (Some(genres), false) = (&patch.genres, seen.tags) {
        if !genres.is_empty() {
            lead_in(writer)?;
            write_text_elements(writer, "tag", genres)?;
            writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
            }
    }
    if let (Some(actors), false) = (&patch.actors, seen.actors) {
        if !actors.is_empty() {
            lead_in(writer)?;
            write_actor_elements(writer, actors)?;
            writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
            }
    }

    Ok(())
}
