use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

use canopy::{
    Canvas, CanvasShared, CollapseBehavior, CpuRendererFactory, DomainEdge, DomainNode,
    LayoutNode, ReflowLimits, Renderer, RendererConfig, RendererRegistry, Size, ViewEdge,
    ViewNode, ViewState, ViewType, reflow_container, resize_container_to_fit_children,
};

#[derive(Parser, Debug)]
#[command(name = "canopy", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a diagram as a PNG.
    Frame(FrameArgs),
    /// Print diagram statistics without rendering.
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input diagram JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Canvas width in pixels.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Canvas height in pixels.
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,

    /// TTF/OTF font file for node labels. Labels are skipped without one.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Draw the frame-stats overlay.
    #[arg(long)]
    debug: bool,

    /// Keep the identity camera instead of fitting the content into view.
    #[arg(long)]
    no_fit: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Input diagram JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    #[cfg(feature = "gpu")]
    Gpu,
}

/// On-disk diagram document: flat entity lists, or a `layout` tree from which
/// view nodes are derived and auto-placed.
#[derive(Debug, Default, serde::Deserialize)]
struct DiagramDoc {
    #[serde(default)]
    domain_nodes: Vec<DomainNode>,
    #[serde(default)]
    domain_edges: Vec<DomainEdge>,
    #[serde(default)]
    view_nodes: Vec<ViewNode>,
    #[serde(default)]
    view_edges: Vec<ViewEdge>,
    #[serde(default)]
    layout: Vec<LayoutNode>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Info(args) => cmd_info(args),
    }
}

fn read_diagram(path: &Path) -> anyhow::Result<(ViewState, bool)> {
    let f = File::open(path).with_context(|| format!("open diagram '{}'", path.display()))?;
    let r = BufReader::new(f);
    let doc: DiagramDoc = serde_json::from_reader(r).with_context(|| "parse diagram JSON")?;

    let mut view = ViewState::new();
    for node in doc.domain_nodes {
        view.insert_domain_node(node);
    }
    for edge in doc.domain_edges {
        view.insert_domain_edge(edge);
    }
    for node in doc.view_nodes {
        view.insert_view_node(node);
    }
    for edge in doc.view_edges {
        view.insert_view_edge(edge);
    }
    let needs_placement = !doc.layout.is_empty();
    if needs_placement {
        view.ingest_layout(&doc.layout);
    }
    view.validate()?;
    Ok((view, needs_placement))
}

/// Place freshly ingested nodes: reflow each container's children bottom-up, then
/// grow containers around them.
fn auto_layout(view: &mut ViewState, canvas: Canvas) {
    let viewport = Size::new(f64::from(canvas.width), f64::from(canvas.height));
    let roots: Vec<String> = view
        .view_nodes
        .values()
        .filter(|n| n.parent_id.is_none())
        .map(|n| n.id.clone())
        .collect();

    fn place(view: &mut ViewState, id: &str, viewport: Size) {
        let children = view.children_of(id);
        if children.is_empty() {
            return;
        }
        for child in &children {
            place(view, child, viewport);
        }
        let limits = ReflowLimits {
            container_bounds: view
                .view_nodes
                .get(id)
                .map(|n| Size::new(n.width, n.height)),
            viewport_bounds: Some(viewport),
        };
        reflow_container(view, &children, &limits);
        resize_container_to_fit_children(view, id, &limits);
    }

    for root in &roots {
        place(view, root, viewport);
    }
    let limits = ReflowLimits {
        container_bounds: None,
        viewport_bounds: Some(viewport),
    };
    reflow_container(view, &roots, &limits);
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let (mut view, needs_placement) = read_diagram(&args.in_path)?;
    let canvas = Canvas::new(args.width, args.height)?;
    if needs_placement {
        auto_layout(&mut view, canvas);
    }

    let shared = CanvasShared::shared(view);
    shared.borrow_mut().collapse_behavior = CollapseBehavior::Shrink;

    let font_bytes = match &args.font {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("read font '{}'", path.display()))?,
        ),
        None => None,
    };

    let mut registry = RendererRegistry::new();
    registry.register_factory(Box::new(CpuRendererFactory {
        font_bytes: font_bytes.clone(),
    }));
    #[cfg(feature = "gpu")]
    registry.register_factory(Box::new(canopy::GpuRendererFactory { font_bytes }));

    let mut config = RendererConfig::new("cli", ViewType::Graph, canvas);
    config.want_accelerated = match args.backend {
        BackendChoice::Cpu => false,
        #[cfg(feature = "gpu")]
        BackendChoice::Gpu => true,
    };

    let renderer = registry
        .create_renderer(&config, &shared)
        .context("no renderer could be created")?;

    if !args.no_fit {
        let bounds = shared.borrow().view.content_bounds();
        if let Some(bounds) = bounds {
            shared.borrow_mut().camera = canopy::fit_to_content(bounds, canvas);
        }
    }

    let stats = renderer.render();
    let frame = renderer.frame_rgba8()?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &frame,
        canvas.width,
        canvas.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    if args.debug {
        eprintln!(
            "rendered {} nodes ({} culled) in {:.2} ms",
            stats.nodes_rendered, stats.nodes_culled, stats.render_time_ms
        );
    }
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let (view, _) = read_diagram(&args.in_path)?;
    let roots = view
        .view_nodes
        .values()
        .filter(|n| n.parent_id.is_none())
        .count();
    let collapsed = view.view_nodes.values().filter(|n| n.collapsed).count();
    let resolved = view.resolved_edges();
    let inherited = resolved.iter().filter(|e| e.inherited).count();

    eprintln!("diagram {}:", args.in_path.display());
    eprintln!(
        "  nodes:  {} view ({} roots, {} collapsed), {} domain",
        view.view_nodes.len(),
        roots,
        collapsed,
        view.domain_nodes.len()
    );
    eprintln!(
        "  edges:  {} base -> {} resolved ({} inherited)",
        view.view_edges.len(),
        resolved.len(),
        inherited
    );
    if let Some(bounds) = view.content_bounds() {
        eprintln!(
            "  bounds: {:.0}x{:.0} at ({:.0}, {:.0})",
            bounds.width(),
            bounds.height(),
            bounds.x0,
            bounds.y0
        );
    }
    Ok(())
}
