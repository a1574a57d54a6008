//! Entry document resolution for extracted bundles.

use std::path::Path;

use crate::domain::file_types::AllowedExtension;

use super::archive::ExtractedMember;

const ENTRY_STEM: &str = "index";

/// First file member named `index.<markup>` in scan order.
///
/// Later candidates are not inspected, so a bundle holding both `index.htm`
/// and `index.html` resolves to whichever the scan reaches first.
pub fn find_index<'a, I>(members: I) -> Option<&'a Path>
where
    I: IntoIterator<Item = &'a ExtractedMember>,
{
    members
        .into_iter()
        .filter(|member| !member.is_directory)
        .find(|member| is_entry_name(&member.path))
        .map(|member| member.path.as_path())
}

fn is_entry_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let Some((stem, suffix)) = name.rsplit_once('.') else {
        return false;
    };
    stem.eq_ignore_ascii_case(ENTRY_STEM)
        && AllowedExtension::from_suffix(suffix).is_some_and(AllowedExtension::is_markup)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn file(path: &str) -> ExtractedMember {
        ExtractedMember {
            path: PathBuf::from("/scratch").join(path),
            relative: PathBuf::from(path),
            is_directory: false,
        }
    }

    fn dir(path: &str) -> ExtractedMember {
        ExtractedMember {
            is_directory: true,
            ..file(path)
        }
    }

    #[test]
    fn finds_html_and_htm_entries() {
        let members = [file("main.css"), file("index.html")];
        assert_eq!(
            find_index(&members),
            Some(Path::new("/scratch/index.html"))
        );

        let members = [file("index.htm")];
        assert_eq!(find_index(&members), Some(Path::new("/scratch/index.htm")));
    }

    #[test]
    fn name_match_ignores_case() {
        let members = [file("INDEX.HTML")];
        assert_eq!(find_index(&members), Some(Path::new("/scratch/INDEX.HTML")));
    }

    #[test]
    fn non_markup_index_files_are_skipped() {
        let members = [file("index.css"), file("index.json"), file("index")];
        assert_eq!(find_index(&members), None);
    }

    #[test]
    fn other_markup_files_are_not_entries() {
        let members = [file("report.html"), file("indexes.html"), file("my-index.html")];
        assert_eq!(find_index(&members), None);
    }

    #[test]
    fn directories_named_like_entries_are_ignored() {
        let members = [dir("index.html"), file("index.html/page.css")];
        assert_eq!(find_index(&members), None);
    }

    #[test]
    fn first_candidate_in_scan_order_wins() {
        let members = [file("index.htm"), file("index.html")];
        assert_eq!(find_index(&members), Some(Path::new("/scratch/index.htm")));

        let members = [dir("pages"), file("pages/index.html"), file("index.html")];
        assert_eq!(
            find_index(&members),
            Some(Path::new("/scratch/pages/index.html"))
        );
    }

    #[test]
    fn empty_listing_has_no_entry() {
        assert_eq!(find_index(&[]), None);
    }
}
