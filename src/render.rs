//! Minimal html timeline. Each interval gets its own row inside its phase;
//! horizontal placement comes from [`TimeScale`].

use crate::{
    BootData, BootgraphResult, FuncKind, HostInfo, Interval, PALETTE, Phase, PhaseKind, TimeScale,
    color_for_name,
};

const ROW_HEIGHT_PX: usize = 20;
const SCALE_HEIGHT_PX: usize = 24;
const INDENT_PX: usize = 12;

pub struct RenderOptions<'a> {
    pub title: &'a str,
    pub host: &'a HostInfo,
    pub add_logs: bool,
}

pub fn render_html(data: &BootData, opts: &RenderOptions<'_>) -> BootgraphResult<String> {
    let scale = TimeScale::new(data.start, data.end)?;
    let total_ms = scale.total() * 1000.0;

    let mut body = String::new();
    body.push_str(&format!(
        "<h1>{}</h1><table class=\"info\"><tr><td>host {}</td><td>kernel {}</td><td>test time {}</td><td>boot time {}</td></tr></table>",
        escape_xml(opts.title),
        escape_xml(&opts.host.hostname),
        escape_xml(data.kernel.as_deref().unwrap_or(&opts.host.kernel)),
        escape_xml(&opts.host.test_time),
        escape_xml(data.boottime.as_deref().unwrap_or("unknown")),
    ));
    let headline = if data.phases.contains_key(&PhaseKind::Boot) {
        "Time from Kernel Boot to start of User Mode"
    } else {
        "Measured trace span"
    };
    body.push_str(&format!(
        "<table class=\"time1\"><tr><td class=\"blue\">{headline}: <b>{total_ms:.0} ms</b></td></tr></table>"
    ));

    for phase in data.phases.values() {
        if phase.is_empty() {
            continue;
        }
        let height = SCALE_HEIGHT_PX + phase.len() * ROW_HEIGHT_PX;
        body.push_str(&format!(
            "<h2>{}</h2><div class=\"timeline\" style=\"height:{height}px\">",
            phase.kind
        ));
        if let (Some(start), Some(end)) = (phase.start, phase.end) {
            body.push_str(&format!(
                "<div class=\"phase\" style=\"left:{:.3}%;width:{:.3}%;height:{SCALE_HEIGHT_PX}px;background:{}\">{}</div>",
                scale.left(start),
                scale.width(start, end),
                phase.color,
                phase.kind
            ));
        }
        for (row, interval) in phase.intervals.values().enumerate() {
            let color = color_for_name(&interval.name);
            let top = SCALE_HEIGHT_PX + row * ROW_HEIGHT_PX;
            let title = format!(
                "{} ({:.3} ms){}",
                interval.name,
                interval.duration() * 1000.0,
                if interval.callgraph.is_some() { " +callgraph" } else { "" }
            );
            body.push_str(&format!(
                "<div id=\"{}\" class=\"thread {}\" title=\"{}\" style=\"left:{:.3}%;top:{top}px;width:{:.3}%;height:{ROW_HEIGHT_PX}px\">{}</div>",
                escape_xml(&interval.id),
                color.class,
                escape_xml(&title),
                scale.left(interval.start),
                scale.width(interval.start, interval.end),
                escape_xml(&interval.name),
            ));
        }
        body.push_str("</div>");
    }

    for phase in data.phases.values() {
        body.push_str(&callgraph_html(phase));
    }

    if opts.add_logs {
        body.push_str("<div id=\"dmesglog\" style=\"display:none;\">\n");
        for line in &data.log {
            body.push_str(&escape_xml(line));
            body.push('\n');
        }
        body.push_str("</div>");
    }

    let mut palette_css = String::new();
    for c in PALETTE {
        palette_css.push_str(&format!(".{}{{background:{}}}", c.class, c.hex));
    }
    Ok(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title><style>body{{font-family:ui-monospace,Menlo,monospace;padding:20px}}.timeline{{position:relative;border:1px solid #999;margin-bottom:16px}}.phase,.thread{{position:absolute;box-sizing:border-box;overflow:hidden;white-space:nowrap;font-size:11px}}.phase{{top:0}}.thread{{border:1px solid #555}}.callgraph ul{{list-style:none;margin:0;padding:0}}{palette_css}</style></head><body>{body}</body></html>",
        escape_xml(opts.title)
    ))
}

/// Hidden call graph listings for the phase's intervals, ordered by start.
fn callgraph_html(phase: &Phase) -> String {
    let mut out = String::new();
    for name in phase.sorted_by_start() {
        let Some(interval) = phase.get(name) else {
            continue;
        };
        if interval.callgraph.is_some() {
            out.push_str(&interval_callgraph_html(interval));
        }
    }
    out
}

fn interval_callgraph_html(interval: &Interval) -> String {
    let Some(cg) = &interval.callgraph else {
        return String::new();
    };
    let mut rows = String::new();
    for line in cg.lines.iter().filter(|l| l.kind != FuncKind::Return) {
        rows.push_str(&format!(
            "<li style=\"padding-left:{}px\">{} ({:.3} ms)</li>",
            line.depth * INDENT_PX,
            escape_xml(&line.name),
            line.length * 1000.0
        ));
    }
    format!(
        "<div id=\"{}-cg\" class=\"callgraph\" style=\"display:none;\"><h3>{} {}-{}</h3><ul>{rows}</ul></div>",
        escape_xml(&interval.id),
        escape_xml(&interval.name),
        escape_xml(&cg.proc),
        cg.pid
    )
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallGraph, FuncLine, NewInterval};

    fn host() -> HostInfo {
        HostInfo {
            hostname: "box".to_string(),
            kernel: "6.1.0".to_string(),
            test_time: "2024-03-01_10:00:05".to_string(),
        }
    }

    #[test]
    fn renders_interval_blocks_with_palette_class() {
        let mut data = BootData::new(&[PhaseKind::Boot]);
        data.new_action(PhaseKind::Boot, NewInterval::new("foo<bar>", 1.0, 2.0));
        data.end = 4.0;
        data.log.push("[    1.0] <x>".to_string());
        let host = host();
        let html = render_html(
            &data,
            &RenderOptions { title: "bootgraph", host: &host, add_logs: true },
        )
        .expect("html");
        assert!(html.contains("left:25.000%"));
        assert!(html.contains("width:25.000%"));
        assert!(html.contains("foo&lt;bar&gt;"));
        assert!(html.contains(color_for_name("foo<bar>").class));
        assert!(html.contains("4000 ms"));
        assert!(html.contains("[    1.0] &lt;x&gt;"));
    }

    #[test]
    fn zero_span_is_rejected() {
        let data = BootData::new(&[PhaseKind::Boot]);
        let host = host();
        let res = render_html(&data, &RenderOptions { title: "t", host: &host, add_logs: false });
        assert!(matches!(res, Err(crate::BootgraphError::NoTimeline { .. })));
    }

    fn graph(root: &str, child: &str, start: f64, end: f64) -> CallGraph {
        let mut cg = CallGraph::new("swapper/0", 1);
        cg.add_line(FuncLine { time: start, depth: 0, kind: FuncKind::Call, name: root.to_string(), length: 0.0 });
        cg.add_line(FuncLine { time: start + 0.001, depth: 1, kind: FuncKind::Leaf, name: child.to_string(), length: 0.002 });
        cg.add_line(FuncLine { time: end, depth: 0, kind: FuncKind::Return, name: String::new(), length: 0.0 });
        assert!(cg.post_process());
        cg
    }

    #[test]
    fn attached_callgraphs_are_listed_by_start() {
        let mut data = BootData::new(&[PhaseKind::Boot]);
        data.new_action(PhaseKind::Boot, NewInterval::new("late_init", 3.0, 4.0));
        data.new_action(PhaseKind::Boot, NewInterval::new("early_init", 1.0, 2.0));
        let boot = data.phase_mut(PhaseKind::Boot);
        if let Some(i) = boot.intervals.get_mut("late_init") {
            i.callgraph = Some(graph("late_fn", "late_child", 3.1, 3.9));
        }
        if let Some(i) = boot.intervals.get_mut("early_init") {
            i.callgraph = Some(graph("early_fn", "early_child", 1.1, 1.9));
        }
        data.end = 4.0;
        let host = host();
        let html = render_html(&data, &RenderOptions { title: "bootgraph", host: &host, add_logs: false })
            .expect("html");

        assert!(html.contains("class=\"callgraph\""));
        assert!(html.contains("padding-left:12px\">early_child (2.000 ms)"));
        assert!(html.contains("padding-left:0px\">early_fn (800.000 ms)"));
        let early = html.find("early_fn").expect("early graph");
        let late = html.find("late_fn").expect("late graph");
        assert!(early < late);
    }

    #[test]
    fn intervals_without_graphs_have_no_listing() {
        let mut data = BootData::new(&[PhaseKind::Boot]);
        data.new_action(PhaseKind::Boot, NewInterval::new("plain", 1.0, 2.0));
        data.end = 2.0;
        let host = host();
        let html = render_html(&data, &RenderOptions { title: "t", host: &host, add_logs: false })
            .expect("html");
        assert!(!html.contains("class=\"callgraph\""));
    }
}
