//! End-to-end rewriting behaviour over in-memory archives.

use av_dom::Element;
use av_dom::Node;
use av_html::HtmlParser;
use av_net::ArchivePath;
use av_net::ExternalFetcher;
use av_net::OfflineFetcher;
use av_net::StaticFetcher;
use av_security::HostPolicy;
use av_storage::MemoryArchive;
use av_viewer::INERT_TARGET;
use av_viewer::PLACEHOLDER_PREFIX;
use av_viewer::Viewer;
use av_viewer::ViewerConfig;
use std::sync::Arc;

async fn open(archive: MemoryArchive, config: ViewerConfig, fetcher: Arc<dyn ExternalFetcher>) -> Viewer {
    match Viewer::open_archive(&archive, config, fetcher).await {
        Ok(viewer) => viewer,
        Err(error) => panic!("{error}"),
    }
}

async fn open_default(archive: MemoryArchive) -> Viewer {
    open(archive, ViewerConfig::default(), Arc::new(OfflineFetcher)).await
}

async fn root(viewer: &Viewer, path: &str) -> String {
    match viewer.open_root_document(path, None).await {
        Ok(locator) => locator,
        Err(error) => panic!("{error}"),
    }
}

fn text(viewer: &Viewer, locator: &str) -> String {
    match viewer.read_locator(locator) {
        Some(content) => String::from_utf8_lossy(&content.bytes).into_owned(),
        None => panic!("locator `{locator}` is not readable"),
    }
}

fn original_locator(viewer: &Viewer, path: &str) -> String {
    match viewer.store().get(&ArchivePath::new(path)) {
        Some(resource) => resource.locator,
        None => panic!("`{path}` is not in the archive"),
    }
}

fn collect<'a>(nodes: &'a [Node], name: &str, out: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(element) = node {
            if element.is(name) {
                out.push(element);
            }
            collect(&element.children, name, out);
        }
    }
}

/// Values of `attr` on every `tag` element, in document order.
fn attr_values(markup: &str, mime: &str, tag: &str, attr: &str) -> Vec<String> {
    let parsed = match HtmlParser.parse(markup.as_bytes(), mime) {
        Ok(parsed) => parsed,
        Err(error) => panic!("{error}"),
    };
    let mut elements = Vec::new();
    collect(&parsed.document.children, tag, &mut elements);
    elements
        .into_iter()
        .filter_map(|element| element.attr(attr).map(str::to_owned))
        .collect()
}

fn html_attrs(markup: &str, tag: &str, attr: &str) -> Vec<String> {
    attr_values(markup, "text/html", tag, attr)
}

#[tokio::test]
async fn anchors_back_into_the_same_document_keep_only_the_fragment() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "a.html",
                "<a href='a.html#top'>1</a><a href='a.html'>2</a><a href='#x'>3</a><a href='b.html#y'>4</a>",
            )
            .with_entry("b.html", "<p>b</p>"),
    )
    .await;

    let page = text(&viewer, &root(&viewer, "a.html").await);
    let b = original_locator(&viewer, "b.html");
    assert_eq!(
        html_attrs(&page, "a", "href"),
        vec![
            "#top".to_owned(),
            "#".to_owned(),
            "#x".to_owned(),
            format!("{b}#y"),
        ]
    );
}

#[tokio::test]
async fn mutually_framing_documents_terminate() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry("a.html", "<iframe src='b.html'></iframe>")
            .with_entry("b.html", "<frameset><frame src='a.html#again'></frameset>"),
    )
    .await;

    let a = text(&viewer, &root(&viewer, "a.html").await);
    let frames = html_attrs(&a, "iframe", "src");
    assert_eq!(frames.len(), 1);
    assert!(viewer.store().is_rewritten(&frames[0]));
    assert_eq!(
        viewer.store().path_for_locator(&frames[0]),
        Some(ArchivePath::new("b.html"))
    );

    let b = text(&viewer, &frames[0]);
    assert_eq!(html_attrs(&b, "frame", "src"), vec![INERT_TARGET.to_owned()]);
}

#[tokio::test]
async fn self_framing_document_gets_inert_frame() {
    let viewer = open_default(MemoryArchive::new().with_entry("a.html", "<iframe src=''></iframe>")).await;
    let a = text(&viewer, &root(&viewer, "a.html").await);
    assert_eq!(html_attrs(&a, "iframe", "src"), vec![INERT_TARGET.to_owned()]);
}

#[tokio::test]
async fn meta_refresh_within_page_keeps_the_fragment() {
    let viewer = open_default(MemoryArchive::new().with_entry(
        "a.html",
        "<meta http-equiv=refresh content=\"0;url=#section\"><p id=section>",
    ))
    .await;
    let a = text(&viewer, &root(&viewer, "a.html").await);
    assert_eq!(html_attrs(&a, "meta", "content"), vec!["0;url=#section".to_owned()]);
}

#[tokio::test]
async fn meta_refresh_to_archive_page_uses_its_rewritten_locator() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry("a.html", "<meta http-equiv=refresh content=\"3; url=B.html#end\">")
            .with_entry("B.html", "<p>b</p>"),
    )
    .await;
    let a = text(&viewer, &root(&viewer, "a.html").await);
    let content = html_attrs(&a, "meta", "content");
    assert_eq!(content.len(), 1);

    let Some(target) = content[0].strip_prefix("3;url=") else {
        panic!("unexpected refresh content `{}`", content[0]);
    };
    let Some(locator) = target.strip_suffix("#end") else {
        panic!("fragment lost in `{target}`");
    };
    assert!(viewer.store().is_rewritten(locator));
    assert_eq!(
        viewer.store().path_for_locator(locator),
        Some(ArchivePath::new("B.html"))
    );
}

#[tokio::test]
async fn meta_refresh_to_external_page_goes_through_a_notice() {
    let viewer = open_default(MemoryArchive::new().with_entry(
        "a.html",
        "<meta http-equiv=refresh content=\"0;url=https://example.com/B.html#frag\">",
    ))
    .await;
    let a = text(&viewer, &root(&viewer, "a.html").await);
    let content = html_attrs(&a, "meta", "content");

    let Some(target) = content[0].strip_prefix("0;url=") else {
        panic!("unexpected refresh content `{}`", content[0]);
    };
    assert!(!target.contains("example.com"));
    let Some(notice) = target.strip_suffix("#frag") else {
        panic!("fragment lost in `{target}`");
    };

    let page = text(&viewer, notice);
    assert_eq!(
        html_attrs(&page, "a", "href"),
        vec!["https://example.com/B.html#frag".to_owned()]
    );
}

#[tokio::test]
async fn meta_refresh_loops_are_cut() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry("a.html", "<meta http-equiv=refresh content='0;url=b.html'>")
            .with_entry("b.html", "<meta http-equiv=refresh content='0;url=a.html'>"),
    )
    .await;
    let a = text(&viewer, &root(&viewer, "a.html").await);
    let content = html_attrs(&a, "meta", "content");
    let Some(b_locator) = content[0].strip_prefix("0;url=") else {
        panic!("unexpected refresh content `{}`", content[0]);
    };
    let b = text(&viewer, b_locator);
    assert_eq!(
        html_attrs(&b, "meta", "content"),
        vec![format!("0;url={INERT_TARGET}")]
    );
}

#[tokio::test]
async fn linked_stylesheet_substitutes_every_reference() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry("index.html", "<link rel='stylesheet' href='css/main.css'>")
            .with_entry(
                "css/main.css",
                "@import \"print.css\";\n\
                 @import url(main.css);\n\
                 .a { background: url(../img/a.png) }\n\
                 .b { background: url(https://cdn.example.com/x.png) }\n\
                 .c { background: url('gone.png') }\n",
            )
            .with_entry("css/print.css", "@import 'main.css';")
            .with_entry("img/a.png", vec![0_u8]),
    )
    .await;

    let index = text(&viewer, &root(&viewer, "index.html").await);
    let hrefs = html_attrs(&index, "link", "href");
    let main_locator = hrefs
        .iter()
        .find(|href| viewer.store().path_for_locator(href) == Some(ArchivePath::new("css/main.css")))
        .cloned();
    let Some(main_locator) = main_locator else {
        panic!("stylesheet link not rewritten: {hrefs:?}");
    };
    assert!(viewer.store().is_rewritten(&main_locator));

    let css = text(&viewer, &main_locator);
    assert!(!css.contains(PLACEHOLDER_PREFIX));
    assert_eq!(css.matches("url(\"").count(), 5);
    assert!(css.contains(&format!("@import url(\"{INERT_TARGET}\");")));
    assert!(css.contains(&format!("url(\"{}\")", original_locator(&viewer, "img/a.png"))));
    assert!(css.contains("url(\"https://cdn.example.com/x.png\")"));
    assert!(css.contains("url(\"gone.png\")"));

    let Some(print_locator) = css
        .strip_prefix("@import url(\"")
        .and_then(|rest| rest.split('"').next())
    else {
        panic!("first import not rewritten: {css}");
    };
    let print = text(&viewer, print_locator);
    assert_eq!(print, format!("@import url(\"{INERT_TARGET}\");"));
}

#[tokio::test]
async fn missing_resources_degrade_to_their_original_text() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<img src='img/missing.png' srcset='img/a.png 1x, img/missing.png 2x'><iframe src='nope.html'></iframe>",
            )
            .with_entry("img/a.png", vec![0_u8]),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    let a = original_locator(&viewer, "img/a.png");

    assert_eq!(html_attrs(&index, "img", "src"), vec!["img/missing.png".to_owned()]);
    assert_eq!(
        html_attrs(&index, "img", "srcset"),
        vec![format!("{a} 1x, img/missing.png 2x")]
    );
    assert_eq!(html_attrs(&index, "iframe", "src"), vec!["nope.html".to_owned()]);
}

#[tokio::test]
async fn untransformed_locators_are_stable() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry("index.html", "<img src='a.png'><img src='./a.png'><video poster='a.png'></video>")
            .with_entry("a.png", vec![0_u8]),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    let a = original_locator(&viewer, "a.png");
    assert_eq!(html_attrs(&index, "img", "src"), vec![a.clone(), a.clone()]);
    assert_eq!(html_attrs(&index, "video", "poster"), vec![a]);
}

#[tokio::test]
async fn head_gets_sanitizer_then_reset_stylesheet() {
    let viewer = open_default(
        MemoryArchive::new().with_entry("index.html", "<html><head><title>t</title></head><body></body></html>"),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);

    let parsed = match HtmlParser.parse(index.as_bytes(), "text/html") {
        Ok(parsed) => parsed,
        Err(error) => panic!("{error}"),
    };
    let mut heads = Vec::new();
    collect(&parsed.document.children, "head", &mut heads);
    let names: Vec<String> = heads[0].child_elements().map(Element::local_name).collect();
    assert_eq!(names, vec!["script", "link", "title"]);

    let scripts = html_attrs(&index, "script", "src");
    let sanitizer = text(&viewer, &scripts[0]);
    assert!(sanitizer.contains("delete window"));
}

#[tokio::test]
async fn svg_documents_get_no_head_assets() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry("index.html", "<iframe src='pic.svg'></iframe>")
            .with_entry(
                "pic.svg",
                "<svg xmlns='http://www.w3.org/2000/svg' xmlns:xlink='http://www.w3.org/1999/xlink'>\
                 <use xlink:href='#dot'/><image href='a.png'/></svg>",
            )
            .with_entry("a.png", vec![0_u8]),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    let frames = html_attrs(&index, "iframe", "src");
    let svg = text(&viewer, &frames[0]);

    assert!(!svg.contains("<script"));
    assert!(svg.contains("<use xlink:href='#dot'/>"));
    assert_eq!(
        attr_values(&svg, "image/svg+xml", "image", "href"),
        vec![original_locator(&viewer, "a.png")]
    );
}

#[tokio::test]
async fn inline_svg_and_mathml_links_follow_the_self_link_rule() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<svg><a xlink:href='index.html#c'><text>x</text></a></svg>\
                 <math><mi href='other.html'>y</mi></math>",
            )
            .with_entry("other.html", "<p>"),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    assert_eq!(html_attrs(&index, "a", "xlink:href"), vec!["#c".to_owned()]);
    assert_eq!(
        html_attrs(&index, "mi", "href"),
        vec![original_locator(&viewer, "other.html")]
    );
}

#[tokio::test]
async fn external_scripts_are_localized_or_neutralized() {
    let fetcher = StaticFetcher::new().with_response(
        "https://cdn.example.com/lib.js",
        "application/javascript",
        "lib();",
    );
    let viewer = open(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<script src='https://cdn.example.com/lib.js'></script>\
                 <script src='https://cdn.example.com/gone.js'></script>\
                 <script src='js/app.js'></script>",
            )
            .with_entry("js/app.js", "app();"),
        ViewerConfig::default(),
        Arc::new(fetcher),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    let sources = html_attrs(&index, "script", "src");

    // Sanitizer first, then the document's own scripts.
    assert_eq!(sources.len(), 4);
    assert_eq!(text(&viewer, &sources[1]), "lib();");
    assert_eq!(sources[2], INERT_TARGET);
    assert_eq!(sources[3], original_locator(&viewer, "js/app.js"));
}

#[tokio::test]
async fn allowed_external_scripts_pass_through() {
    let config = ViewerConfig {
        policy: HostPolicy {
            allow_external_scripts: true,
            ..HostPolicy::default()
        },
        ..ViewerConfig::default()
    };
    let viewer = open(
        MemoryArchive::new().with_entry("index.html", "<script src='https://cdn.example.com/lib.js'></script>"),
        config,
        Arc::new(OfflineFetcher),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    assert!(index.contains("src='https://cdn.example.com/lib.js'"));
}

#[tokio::test]
async fn inline_scripts_move_behind_locators_when_disallowed() {
    let config = ViewerConfig {
        policy: HostPolicy {
            allow_inline_scripts: false,
            remove_privileged_apis: false,
            ..HostPolicy::default()
        },
        reset_stylesheet: String::new(),
        ..ViewerConfig::default()
    };
    let viewer = open(
        MemoryArchive::new().with_entry(
            "index.html",
            "<script>var a = 1;</script><script type='application/ld+json'>{}</script>",
        ),
        config,
        Arc::new(OfflineFetcher),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    let sources = html_attrs(&index, "script", "src");
    assert_eq!(sources.len(), 1);
    assert_eq!(text(&viewer, &sources[0]), "var a = 1;");
    assert!(index.contains(&format!("<script src=\"{}\"></script>", sources[0])));
    assert!(index.contains("<script type='application/ld+json'>{}</script>"));
    assert!(!index.contains("<link"));
}

#[tokio::test]
async fn base_href_anchors_resolution_and_is_dropped() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry("index.html", "<head><base href='sub/'></head><img src='a.png'>")
            .with_entry("sub/a.png", vec![0_u8]),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    assert!(!index.contains("<base"));
    assert_eq!(
        html_attrs(&index, "img", "src"),
        vec![original_locator(&viewer, "sub/a.png")]
    );
}

#[tokio::test]
async fn inline_styles_are_rewritten() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<style>body { background: url('a.png') }</style>\
                 <div style=\"background-image: url(a.png)\"></div>",
            )
            .with_entry("a.png", vec![0_u8]),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    let a = original_locator(&viewer, "a.png");
    assert!(index.contains(&format!("<style>body {{ background: url(\"{a}\") }}</style>")));
    assert_eq!(
        html_attrs(&index, "div", "style"),
        vec![format!("background-image: url(\"{a}\")")]
    );
}

#[tokio::test]
async fn unparsable_documents_are_served_unmodified() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry("index.html", "<iframe src='broken.xhtml'></iframe>")
            .with_entry("broken.xhtml", "<!-- no root element -->"),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    let frames = html_attrs(&index, "iframe", "src");

    let content = match viewer.read_locator(&frames[0]) {
        Some(content) => content,
        None => panic!("frame locator unreadable"),
    };
    assert_eq!(&*content.bytes, b"<!-- no root element -->");
    assert_eq!(content.mime_type, "application/xhtml+xml");
}

#[tokio::test]
async fn legacy_encodings_are_transcoded_to_utf8() {
    let viewer = open_default(
        MemoryArchive::new().with_entry("index.html", b"<meta charset=windows-1252><p>caf\xE9</p>".to_vec()),
    )
    .await;
    let locator = root(&viewer, "index.html").await;
    let content = match viewer.read_locator(&locator) {
        Some(content) => content,
        None => panic!("root unreadable"),
    };
    assert_eq!(content.mime_type, "text/html;charset=UTF-8");
    let index = String::from_utf8_lossy(&content.bytes).into_owned();
    assert!(index.contains("caf\u{e9}"));
    assert_eq!(html_attrs(&index, "meta", "charset"), vec!["UTF-8".to_owned()]);
}

#[tokio::test]
async fn external_plugin_bytes_are_localized_when_fetchable() {
    let fetcher = StaticFetcher::new().with_response(
        "https://cdn.example.com/x.swf",
        "application/x-shockwave-flash",
        "FWS",
    );
    let viewer = open(
        MemoryArchive::new().with_entry(
            "index.html",
            "<object data='https://cdn.example.com/x.swf'></object>\
             <embed src='https://cdn.example.com/gone.swf'>\
             <embed src='movies/intro.swf'>",
        )
        .with_entry("movies/intro.swf", "CWS"),
        ViewerConfig::default(),
        Arc::new(fetcher),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);

    let data = html_attrs(&index, "object", "data");
    assert_eq!(data.len(), 1);
    assert!(data[0].starts_with("blob:archive-viewer/"));
    assert_eq!(text(&viewer, &data[0]), "FWS");
    assert_eq!(
        html_attrs(&index, "embed", "src"),
        vec![
            "https://cdn.example.com/gone.swf".to_owned(),
            original_locator(&viewer, "movies/intro.swf"),
        ]
    );
}

#[tokio::test]
async fn offline_plugins_keep_their_external_url() {
    let viewer = open_default(MemoryArchive::new().with_entry(
        "index.html",
        "<object data='https://cdn.example.com/x.swf'></object>",
    ))
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    assert_eq!(
        html_attrs(&index, "object", "data"),
        vec!["https://cdn.example.com/x.swf".to_owned()]
    );
}

#[tokio::test]
async fn applet_code_and_archive_are_rewritten() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<applet code='Main.class' archive='lib/app.jar'></applet>",
            )
            .with_entry("Main.class", "cafe")
            .with_entry("lib/app.jar", "PK"),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    assert_eq!(
        html_attrs(&index, "applet", "code"),
        vec![original_locator(&viewer, "Main.class")]
    );
    assert_eq!(
        html_attrs(&index, "applet", "archive"),
        vec![original_locator(&viewer, "lib/app.jar")]
    );
}

#[tokio::test]
async fn open_graph_urls_are_rewritten_and_titles_left_alone() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<meta property='og:image' content='img/cover.png'>\
                 <meta property='og:title' content='img/cover.png'>",
            )
            .with_entry("img/cover.png", "png"),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    assert_eq!(
        html_attrs(&index, "meta", "content"),
        vec![
            original_locator(&viewer, "img/cover.png"),
            "img/cover.png".to_owned(),
        ]
    );
}

#[tokio::test]
async fn legacy_background_attributes_are_rewritten() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<body background='bg.gif'><table><tr><td background='cell.gif'>x</td></tr></table></body>",
            )
            .with_entry("bg.gif", "GIF89a")
            .with_entry("cell.gif", "GIF89a"),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    assert_eq!(
        html_attrs(&index, "body", "background"),
        vec![original_locator(&viewer, "bg.gif")]
    );
    assert_eq!(
        html_attrs(&index, "td", "background"),
        vec![original_locator(&viewer, "cell.gif")]
    );
}

#[tokio::test]
async fn form_actions_and_image_inputs_are_rewritten() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<form action='search.html'>\
                 <input type=' Image ' src='go.png'>\
                 <input type='text' src='go.png'>\
                 </form>",
            )
            .with_entry("search.html", "<p>results</p>")
            .with_entry("go.png", "png"),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    assert_eq!(
        html_attrs(&index, "form", "action"),
        vec![original_locator(&viewer, "search.html")]
    );
    assert_eq!(
        html_attrs(&index, "input", "src"),
        vec![original_locator(&viewer, "go.png"), "go.png".to_owned()]
    );
}

#[tokio::test]
async fn non_stylesheet_links_point_at_the_original_resource() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<link rel='icon' href='favicon.ico'><link rel='next' href='two.html'>",
            )
            .with_entry("favicon.ico", "ico")
            .with_entry("two.html", "<p>two</p>"),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    let hrefs = html_attrs(&index, "link", "href");
    assert!(hrefs.contains(&original_locator(&viewer, "favicon.ico")));
    assert!(hrefs.contains(&original_locator(&viewer, "two.html")));
    assert!(!viewer.store().is_rewritten(&original_locator(&viewer, "two.html")));
}

#[tokio::test]
async fn untouched_markup_keeps_its_spelling() {
    let viewer = open_default(
        MemoryArchive::new()
            .with_entry(
                "index.html",
                "<div  id = \"k\"\n>t</div ><img\tsrc=a.png\talt=x >",
            )
            .with_entry("a.png", "png"),
    )
    .await;
    let index = text(&viewer, &root(&viewer, "index.html").await);
    assert!(index.contains("<div  id = \"k\"\n>t</div >"));
    let a = original_locator(&viewer, "a.png");
    assert!(index.contains(&format!("<img\tsrc=\"{a}\"\talt=x >")));
}
