//! `artist.nfo` sidecar in the layout media servers read.

use std::io::Cursor;

use color_eyre::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::models::ArtistBootstrapJob;

pub const ARTIST_NFO_FILE: &str = "artist.nfo";

pub fn render_artist_nfo(job: &ArtistBootstrapJob) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Start(BytesStart::new("artist")))?;

    let mut elements = vec![
        ("name", job.name.as_str()),
        ("sortname", job.name.as_str()),
        ("catalogid", job.artist_id.as_str()),
    ];
    elements.extend(job.genres.iter().map(|genre| ("genre", genre.as_str())));
    if let Some(image) = job.primary_image() {
        elements.push(("thumb", image));
    }
    for (name, value) in elements {
        writer
            .create_element(name)
            .write_text_content(BytesText::new(value))?;
    }

    writer.write_event(Event::End(BytesEnd::new("artist")))?;

    let mut nfo = String::from_utf8(writer.into_inner().into_inner())?;
    nfo.push('\n');
    Ok(nfo)
}
