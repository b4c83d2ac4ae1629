use crate::error::PipelineError;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document as PdfDocument;

#[derive(Debug, Clone)]
pub struct PageExcerpt {
    pub pdf: Vec<u8>,
    /// Zero-based index, in the source PDF, of the excerpt's first page.
    pub first_page_index: u32,
    pub page_count: u32,
    /// Position of the cited page inside the excerpt.
    pub cited_offset: u32,
}

impl PageExcerpt {
    /// `data:` URI suitable for an `<iframe>` or `<embed>` source, opened at the cited page.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:application/pdf;base64,{}#page={}",
            STANDARD.encode(&self.pdf),
            self.cited_offset + 1
        )
    }
}

/// Copies pages `center - radius ..= center + radius` (clamped) into a new PDF.
pub fn excerpt_pages(bytes: &[u8], center: u32, radius: u32) -> Result<PageExcerpt, PipelineError> {
    let mut document =
        PdfDocument::load_mem(bytes).map_err(|error| PipelineError::Extraction(error.to_string()))?;

    let total = document.get_pages().len() as u32;
    if center >= total {
        return Err(PipelineError::InvalidArgument(format!(
            "page index {center} is out of range for a {total}-page document"
        )));
    }

    let start = center.saturating_sub(radius);
    let end = center.saturating_add(radius).min(total - 1);

    // lopdf numbers pages from 1.
    let dropped = (1..=total)
        .filter(|number| *number < start + 1 || *number > end + 1)
        .collect::<Vec<_>>();
    if !dropped.is_empty() {
        document.delete_pages(&dropped);
        document.prune_objects();
    }

    let mut pdf = Vec::new();
    document
        .save_to(&mut pdf)
        .map_err(|error| PipelineError::Extraction(error.to_string()))?;

    Ok(PageExcerpt {
        pdf,
        first_page_index: start,
        page_count: end - start + 1,
        cited_offset: center - start,
    })
}

#[cfg(test)]
mod tests {
    use super::excerpt_pages;
    use crate::error::PipelineError;
    use crate::testing::pdf_with_pages;
    use lopdf::Document;

    fn reloaded_page_count(pdf: &[u8]) -> usize {
        Document::load_mem(pdf)
            .expect("excerpt should be a valid pdf")
            .get_pages()
            .len()
    }

    #[test]
    fn window_is_centered_on_the_cited_page() {
        let bytes = pdf_with_pages(&[""; 7]);
        let excerpt = excerpt_pages(&bytes, 3, 2).expect("excerpt should build");

        assert_eq!(excerpt.first_page_index, 1);
        assert_eq!(excerpt.page_count, 5);
        assert_eq!(excerpt.cited_offset, 2);
        assert_eq!(reloaded_page_count(&excerpt.pdf), 5);
    }

    #[test]
    fn window_is_clamped_at_document_edges() {
        let bytes = pdf_with_pages(&[""; 4]);

        let head = excerpt_pages(&bytes, 0, 2).expect("excerpt should build");
        assert_eq!((head.first_page_index, head.page_count, head.cited_offset), (0, 3, 0));
        assert_eq!(reloaded_page_count(&head.pdf), 3);

        let tail = excerpt_pages(&bytes, 3, 2).expect("excerpt should build");
        assert_eq!((tail.first_page_index, tail.page_count, tail.cited_offset), (1, 3, 2));
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let bytes = pdf_with_pages(&[""; 2]);
        assert!(matches!(
            excerpt_pages(&bytes, 2, 1),
            Err(PipelineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn data_uri_points_at_the_cited_page() {
        let bytes = pdf_with_pages(&[""; 3]);
        let excerpt = excerpt_pages(&bytes, 2, 1).expect("excerpt should build");
        let uri = excerpt.to_data_uri();
        assert!(uri.starts_with("data:application/pdf;base64,"));
        assert!(uri.ends_with("#page=2"));
    }
}
